//! End-to-end scenarios over synthetic little-endian TIFF layouts.

mod util;

use std::sync::Arc;

use chunktiff::store::FileStore;
use chunktiff::{ChunkedSource, Cog, CogError, Tag};
use util::*;

fn source_with(data: Vec<u8>) -> (Arc<MemoryStore>, Arc<ChunkedSource>) {
    let store = MemoryStore::new(data);
    let source = Arc::new(ChunkedSource::new(store.clone()));
    (store, source)
}

#[tokio::test]
async fn minimal_header_yields_no_images() {
    // Header plus a bare zero tag count; there is no room for the trailing
    // next-IFD offset, so the chain ends without producing an image.
    let data = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
    let (_, source) = source_with(data);

    let cog = Cog::open(source).await.unwrap();
    assert!(cog.images().is_empty());
    assert_eq!(cog.source().version(), Some(42));
    assert_eq!(cog.source().name(), "memory");
}

#[tokio::test]
async fn big_endian_is_rejected() {
    let data = vec![0x4D, 0x4D, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
    let (_, source) = source_with(data);

    assert!(matches!(
        Cog::open(source).await,
        Err(CogError::UnsupportedByteOrder)
    ));
}

#[tokio::test]
async fn bad_magic_is_rejected() {
    let data = vec![0x42, 0x42, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
    let (_, source) = source_with(data);

    assert!(matches!(Cog::open(source).await, Err(CogError::BadMagic)));
}

#[tokio::test]
async fn wrong_version_is_rejected() {
    // Version 43 is BigTIFF.
    let data = vec![0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
    let (_, source) = source_with(data);

    assert!(matches!(
        Cog::open(source).await,
        Err(CogError::UnsupportedVersion(43))
    ));
}

#[tokio::test]
async fn single_inline_width_tag() {
    let mut data = header(8);
    data.extend_from_slice(&1u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_SHORT, 1, inline_short(256));
    data.extend_from_slice(&0u32.to_le_bytes());

    let (_, source) = source_with(data);
    let cog = Cog::open(source).await.unwrap();

    let image = cog.image(0).unwrap();
    assert_eq!(image.width(), Some(256));
    // size needs both dimensions
    assert_eq!(image.size(), None);
    assert!(!image.is_tiled());
}

#[tokio::test]
async fn empty_ifd_yields_image_with_no_tags() {
    let mut data = header(8);
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0u32.to_le_bytes());

    let (_, source) = source_with(data);
    let cog = Cog::open(source).await.unwrap();

    assert_eq!(cog.images().len(), 1);
    let image = cog.image(0).unwrap();
    assert_eq!(image.ifd().tag_count(), 0);
    assert!(image.tag_list().is_empty());
    assert!(!image.is_tiled());
}

#[tokio::test]
async fn exactly_four_value_bytes_stay_inline() {
    let mut data = header(8);
    data.extend_from_slice(&1u16.to_le_bytes());
    // two shorts == 4 bytes: the inline branch, not an offset
    push_entry(&mut data, 258, TYPE_SHORT, 2, inline_two_shorts(8, 8));
    data.extend_from_slice(&0u32.to_le_bytes());

    let (store, source) = source_with(data);
    let cog = Cog::open(source).await.unwrap();

    let image = cog.image(0).unwrap();
    assert_eq!(image.bits_per_sample(), Some(vec![8, 8]));
    // nothing beyond the header chunk was touched
    assert_eq!(store.fetches(), 1);
}

#[tokio::test]
async fn overview_chain_parses_in_order() {
    let mut data = header(8);
    // base IFD: 600x400
    data.extend_from_slice(&2u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_LONG, 1, inline_long(600));
    push_entry(&mut data, 257, TYPE_LONG, 1, inline_long(400));
    data.extend_from_slice(&40u32.to_le_bytes()); // next IFD at 40
    pad_to(&mut data, 40);
    // overview IFD: 300x200
    data.extend_from_slice(&2u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_LONG, 1, inline_long(300));
    push_entry(&mut data, 257, TYPE_LONG, 1, inline_long(200));
    data.extend_from_slice(&0u32.to_le_bytes());

    let (_, source) = source_with(data);
    let cog = Cog::open(source).await.unwrap();

    assert_eq!(cog.images().len(), 2);
    assert_eq!(cog.image(0).unwrap().size(), Some((600, 400)));
    assert_eq!(cog.image(1).unwrap().size(), Some((300, 200)));
    assert_eq!(cog.image(1).unwrap().index(), 1);

    assert!(matches!(
        cog.image(2),
        Err(CogError::NoSuchOverview(2))
    ));
    assert!(matches!(
        cog.get_tile_raw(0, 0, 0).await,
        Err(CogError::NotTiled)
    ));
}

/// 512x512 image in 256-pixel tiles; the tile extent arrays live at offset
/// 200, outside every chunk the IFD parse touches with a 32-byte chunk size.
fn lazy_tile_layout() -> Vec<u8> {
    let mut data = header(8);
    data.extend_from_slice(&6u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_LONG, 1, inline_long(512));
    push_entry(&mut data, 257, TYPE_LONG, 1, inline_long(512));
    push_entry(&mut data, 322, TYPE_SHORT, 1, inline_short(256));
    push_entry(&mut data, 323, TYPE_SHORT, 1, inline_short(256));
    push_entry(&mut data, 324, TYPE_LONG, 4, inline_long(200));
    push_entry(&mut data, 325, TYPE_SHORT, 4, inline_long(216));
    data.extend_from_slice(&0u32.to_le_bytes());

    pad_to(&mut data, 200);
    push_u32s(&mut data, &[224, 240, 256, 272]);
    push_u16s(&mut data, &[16, 16, 16, 16]);
    for tile in 0u8..4 {
        data.extend_from_slice(&[tile + 1; 16]);
    }
    assert_eq!(data.len(), 288);
    data
}

#[tokio::test]
async fn lazy_tile_offsets_resolve_with_one_chunk_fetch() {
    let store = MemoryStore::new(lazy_tile_layout());
    let source = Arc::new(ChunkedSource::with_chunk_size(store.clone(), 32));

    let cog = Cog::open(source).await.unwrap();
    // header and IFD entries span chunks 0..=2
    assert_eq!(store.fetches(), 3);

    let image = cog.image(0).unwrap();
    assert!(image.ifd().is_deferred(Tag::TileOffsets));
    assert!(image.ifd().is_deferred(Tag::TileByteCounts));
    assert_eq!(image.tag(Tag::TileOffsets), None);

    // Both arrays live in chunk 6; resolving them costs one fetch.
    image.fetch_tag(Tag::TileOffsets).await.unwrap();
    image.fetch_tag(Tag::TileByteCounts).await.unwrap();
    assert_eq!(store.fetches(), 4);
    assert!(!image.ifd().is_deferred(Tag::TileOffsets));

    // The tile payload itself is one more chunk.
    let tile = cog.get_tile_raw(0, 0, 0).await.unwrap();
    assert_eq!(store.fetches(), 5);
    assert_eq!(&tile.bytes()[..], &[1u8; 16]);
    assert_eq!(cog.source().resident_chunks(), vec![0, 1, 2, 6, 7]);
}

/// 600x400 image in 256-pixel tiles: a 3x2 grid with distinct payloads.
fn grid_layout() -> Vec<u8> {
    let mut data = header(8);
    data.extend_from_slice(&7u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_LONG, 1, inline_long(600));
    push_entry(&mut data, 257, TYPE_LONG, 1, inline_long(400));
    push_entry(&mut data, 259, TYPE_SHORT, 1, inline_short(7));
    push_entry(&mut data, 322, TYPE_SHORT, 1, inline_short(256));
    push_entry(&mut data, 323, TYPE_SHORT, 1, inline_short(256));
    push_entry(&mut data, 324, TYPE_LONG, 6, inline_long(128));
    push_entry(&mut data, 325, TYPE_LONG, 6, inline_long(152));
    data.extend_from_slice(&0u32.to_le_bytes());

    pad_to(&mut data, 128);
    push_u32s(&mut data, &[200, 216, 232, 248, 264, 280]);
    push_u32s(&mut data, &[16, 16, 16, 16, 16, 16]);
    pad_to(&mut data, 200);
    for tile in 0u8..6 {
        data.extend_from_slice(&[tile + 1; 16]);
    }
    data
}

#[tokio::test]
async fn tile_index_is_row_major_with_column_stride() {
    let (_, source) = source_with(grid_layout());
    let cog = Cog::open(source).await.unwrap();

    let image = cog.image(0).unwrap();
    let grid = image.tile_grid().unwrap();
    assert_eq!((grid.across, grid.down), (3, 2));

    // (2, 1) is index 1 * 3 + 2 == 5
    let tile = cog.get_tile_raw(2, 1, 0).await.unwrap();
    assert_eq!(&tile.bytes()[..], &[6u8; 16]);
    assert_eq!(tile.media_type(), Some("image/jpeg"));
    assert_eq!((tile.x(), tile.y()), (2, 1));
}

#[tokio::test]
async fn tile_bounds_are_strict() {
    let (_, source) = source_with(grid_layout());
    let cog = Cog::open(source).await.unwrap();

    // the far corner is valid
    assert!(cog.get_tile_raw(2, 1, 0).await.is_ok());
    assert!(matches!(
        cog.get_tile_raw(3, 0, 0).await,
        Err(CogError::TileOutOfRange { x: 3, y: 0 })
    ));
    assert!(matches!(
        cog.get_tile_raw(0, 2, 0).await,
        Err(CogError::TileOutOfRange { x: 0, y: 2 })
    ));
    assert!(matches!(
        cog.get_tile_raw(0, 0, 9).await,
        Err(CogError::NoSuchOverview(9))
    ));
}

#[tokio::test]
async fn multi_tile_fetch_preserves_order() {
    let (_, source) = source_with(grid_layout());
    let cog = Cog::open(source).await.unwrap();

    let tiles = cog
        .get_tiles_raw(&[(2, 1), (0, 0), (1, 0)], 0)
        .await
        .unwrap();
    assert_eq!(tiles.len(), 3);
    assert_eq!(&tiles[0].bytes()[..], &[6u8; 16]);
    assert_eq!(&tiles[1].bytes()[..], &[1u8; 16]);
    assert_eq!(&tiles[2].bytes()[..], &[2u8; 16]);
}

#[tokio::test]
async fn geo_keys_resolve_through_the_facade() {
    let mut data = header(8);
    data.extend_from_slice(&5u16.to_le_bytes());
    push_entry(&mut data, 256, TYPE_LONG, 1, inline_long(100));
    push_entry(&mut data, 257, TYPE_LONG, 1, inline_long(100));
    push_entry(&mut data, 34735, TYPE_SHORT, 20, inline_long(160));
    push_entry(&mut data, 34736, TYPE_DOUBLE, 2, inline_long(224));
    push_entry(&mut data, 34737, TYPE_ASCII, 8, inline_long(240));
    data.extend_from_slice(&0u32.to_le_bytes());

    pad_to(&mut data, 160);
    push_u16s(
        &mut data,
        &[
            1, 1, 0, 4, //
            1024, 0, 1, 1, // ModelType = projected
            2049, 34737, 7, 0, // GeogCitation -> "WGS 84|"
            2057, 34736, 1, 1, // GeogSemiMajorAxis -> doubles[1]
            3072, 0, 1, 32633, // ProjectedType
        ],
    );
    pad_to(&mut data, 224);
    push_f64s(&mut data, &[0.0, 6_378_137.0]);
    pad_to(&mut data, 240);
    data.extend_from_slice(b"WGS 84|\0");

    let (_, source) = source_with(data);
    let cog = Cog::open(source).await.unwrap();

    assert_eq!(cog.epsg().await.unwrap(), Some(32633));

    let keys = cog
        .image(0)
        .unwrap()
        .geo_key_directory()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(keys.model_type, Some(1));
    assert_eq!(keys.geog_citation.as_deref(), Some("WGS 84"));
    assert_eq!(keys.geog_semi_major_axis, Some(6_378_137.0));
}

#[tokio::test]
async fn file_store_serves_the_same_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.tif");
    tokio::fs::write(&path, grid_layout()).await.unwrap();

    let store = FileStore::open(&path).await.unwrap();
    let source = Arc::new(ChunkedSource::new(Arc::new(store)));
    let cog = Cog::open(source).await.unwrap();

    let tile = cog.get_tile_raw(1, 1, 0).await.unwrap();
    // (1, 1) is index 5 - 1 == 4
    assert_eq!(&tile.bytes()[..], &[5u8; 16]);
    assert!(cog.source().name().ends_with("grid.tif"));
}
