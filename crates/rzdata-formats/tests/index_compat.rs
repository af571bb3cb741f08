//! Compatibility tests against hand-assembled `data.000` images

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use pretty_assertions::assert_eq;
use rzdata_crypto::{ContentCipher, NameCipher};
use rzdata_formats::{DataIndex, IndexError, SortOrder};

/// Assemble a deciphered index image the way the game client lays it out.
fn raw_image(records: &[(&[u8], u32, u32)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, offset, length) in records {
        out.push(u8::try_from(name.len()).expect("short name"));
        out.extend_from_slice(name);
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&length.to_le_bytes());
    }
    out
}

fn ciphered(records: &[(&[u8], u32, u32)]) -> Vec<u8> {
    let mut image = raw_image(records);
    ContentCipher::default().apply_from_start(&mut image);
    image
}

#[test]
fn parses_client_layout() {
    let item = NameCipher::encode("db_item.rdb").expect("encode");
    let monster = NameCipher::encode("db_monster.rdb").expect("encode");
    let data = ciphered(&[
        (item.as_bytes(), 0, 12),
        (monster.as_bytes(), 0, 300),
    ]);

    let index = DataIndex::parse(&data, &ContentCipher::default()).expect("parse");
    assert_eq!(index.len(), 2);

    let first = index.get_at(0).expect("first");
    assert_eq!(first.plain_name(), "db_item.rdb");
    assert_eq!((first.offset(), first.length(), first.shard().get()), (0, 12, 3));

    let second = index.get("db_monster.rdb").expect("second");
    assert_eq!((second.length(), second.shard().get()), (300, 2));
}

#[test]
fn keystream_spans_records() {
    // Twenty records run past 256 bytes, so the keystream index wraps.
    let names: Vec<String> = (0..20)
        .map(|i| NameCipher::encode(&format!("file_{i:02}.xml")).expect("encode"))
        .collect();
    let records: Vec<(&[u8], u32, u32)> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_bytes(), i as u32 * 10, 10))
        .collect();
    let data = ciphered(&records);
    assert!(data.len() > 256);

    let cipher = ContentCipher::default();
    let index = DataIndex::parse(&data, &cipher).expect("parse");
    assert_eq!(index.len(), 20);
    assert_eq!(index.get_at(19).map(|e| e.plain_name()), Some("file_19.xml"));
    assert_eq!(index.build(&cipher).expect("build"), data);
}

#[test]
fn legacy_plain_names_are_written_encoded() {
    let data = ciphered(&[(b"a.dds", 16, 5)]);
    let cipher = ContentCipher::default();
    let index = DataIndex::parse(&data, &cipher).expect("parse");

    let rebuilt = index.build(&cipher).expect("build");
    assert_eq!(
        rebuilt,
        ciphered(&[(NameCipher::encode("a.dds").expect("encode").as_bytes(), 16, 5)])
    );
}

#[test]
fn non_ascii_names_are_rejected() {
    let data = ciphered(&[(b"ok.txt", 0, 1), (&[b'x', 0xFF, b'y'], 1, 1)]);
    match DataIndex::parse(&data, &ContentCipher::default()) {
        Err(IndexError::NonAsciiName { position }) => assert_eq!(position, 15),
        other => panic!("expected non-ascii error, got {other:?}"),
    }
}

#[test]
fn truncated_tail_is_reported() {
    let mut data = ciphered(&[(b"ok.txt", 0, 1)]);
    data.push(0x00);
    assert!(matches!(
        DataIndex::parse(&data, &ContentCipher::default()),
        Err(IndexError::TruncatedRecord { position: 15, .. })
    ));
}

#[test]
fn sort_then_save_orders_records() {
    let cipher = ContentCipher::default();
    let names = ["e.lua", "c.tga", "b.dds"];
    let encoded: Vec<String> = names
        .iter()
        .map(|n| NameCipher::encode(n).expect("encode"))
        .collect();
    let records: Vec<(&[u8], u32, u32)> = encoded.iter().map(|n| (n.as_bytes(), 0, 1)).collect();
    let mut index = DataIndex::parse(&ciphered(&records), &cipher).expect("parse");

    index.sort(SortOrder::Name);
    let saved = DataIndex::parse(&index.build(&cipher).expect("build"), &cipher).expect("parse");
    let order: Vec<_> = saved.iter().map(|e| e.plain_name()).collect();
    assert_eq!(order, ["b.dds", "c.tga", "e.lua"]);
}
