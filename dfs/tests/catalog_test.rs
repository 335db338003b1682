use tempfile::NamedTempFile;

use dfs::io::{DiskImage, DiskImageBuilder};
use dfs::{DfsError, FormatOptions, NodeSummary};

fn fresh_image() -> Vec<u8> {
    let options = FormatOptions::default();
    let mut buf = vec![0; options.partition_size as usize];
    options.format(&mut buf).unwrap();
    buf
}

fn entries(buf: &[u8]) -> Vec<NodeSummary> {
    dfs::list(buf)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn default_format_describes_the_whole_buffer() {
    let buf = fresh_image();
    let info = dfs::info(&buf).unwrap();

    assert_eq!((info.version_major, info.version_minor), (0, 3));
    assert_eq!(info.partition_size, 32_768_000);
    assert_eq!(info.granularity, 512);
    assert_eq!(info.granules, 64_000);
    assert!(!info.has_mirror());
    assert!(!info.has_journal());
    assert_eq!(&buf[0..4], b"4DFS");
    // 8000 units of 4096 bytes, little endian at offset 25.
    assert_eq!(&buf[25..27], &8000u16.to_le_bytes());

    let listed = entries(&buf);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "root");
    assert_eq!(listed[0].offset, info.root_offset);
    assert_eq!((listed[0].user_perms, listed[0].group_perms), (0o777, 0o777));
}

#[test]
fn appending_four_kilobytes_takes_ten_granules() {
    let mut buf = fresh_image();
    let free_before = dfs::info(&buf).unwrap().free_granules;

    let content: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
    dfs::append(&mut buf, "a.txt", &content).unwrap();

    // 488 payload bytes per 512 byte granule: 9 fragments plus the entry.
    let free_after = dfs::info(&buf).unwrap().free_granules;
    assert_eq!(free_before - free_after, 10);

    let names: Vec<String> = entries(&buf).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["root", "a.txt"]);
    assert_eq!(entries(&buf)[1].file_size, 4096);
    assert_eq!(dfs::read_file(&buf, "a.txt").unwrap(), content);
}

#[test]
fn whole_fragments_take_exactly_one_granule_each() {
    let mut buf = fresh_image();
    let free_before = dfs::info(&buf).unwrap().free_granules;

    dfs::append(&mut buf, "even.bin", &[0xAB; 488 * 8]).unwrap();

    assert_eq!(free_before - dfs::info(&buf).unwrap().free_granules, 9);
}

#[test]
fn many_appends_list_in_order_and_read_back() {
    let mut buf = fresh_image();
    let files: Vec<(String, Vec<u8>)> = (0..25)
        .map(|i| (format!("file-{:02}", i), vec![i as u8; i * 97]))
        .collect();
    for (name, content) in &files {
        dfs::append(&mut buf, name, content).unwrap();
    }

    let listed = entries(&buf);
    assert_eq!(listed.len(), files.len() + 1);
    assert_eq!(listed[0].name, "root");
    for ((name, content), entry) in files.iter().zip(&listed[1..]) {
        assert_eq!(&entry.name, name);
        assert_eq!(entry.file_size, content.len() as u64);
        assert_eq!(&dfs::read_file(&buf, name).unwrap(), content);
    }
}

#[test]
fn allocations_never_repeat_until_exhausted() {
    let size = 16 * 4096;
    let mut buf = vec![0; size as usize];
    dfs::format(&mut buf, size, 512).unwrap();
    let free = dfs::info(&buf).unwrap().free_granules;

    let mut issued: Vec<u64> = (0..free)
        .map(|_| dfs::allocate_block(&mut buf).unwrap())
        .collect();
    issued.sort_unstable();
    issued.dedup();
    assert_eq!(issued.len() as u64, free);
    assert_eq!(dfs::info(&buf).unwrap().free_granules, 0);

    match dfs::allocate_block(&mut buf) {
        Err(DfsError::AllocatorExhausted) => (),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn corrupted_fragment_is_reported() {
    let mut buf = fresh_image();
    dfs::append(&mut buf, "a.txt", b"some text").unwrap();
    let first_free = dfs::allocate_block(&mut buf).unwrap();
    // The fragment was allocated right before the granule just handed out.
    let fragment = ((first_free - 1) * 512) as usize;
    buf[fragment + 24] ^= 0xFF;

    assert!(matches!(
        dfs::read_file(&buf, "a.txt"),
        Err(DfsError::ChecksumMismatch { .. })
    ));
}

#[test]
fn unsupported_version_is_rejected() {
    let mut buf = fresh_image();
    buf[4] = 0x10;

    match dfs::list(&buf) {
        Err(DfsError::UnsupportedVersion { major, minor }) => assert_eq!((major, minor), (1, 0)),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("listing an unsupported version succeeded"),
    }
}

#[test]
fn truncated_image_is_too_small() {
    let buf = fresh_image();
    assert!(matches!(
        dfs::list(&buf[..1 << 20]),
        Err(DfsError::BufferTooSmall { .. })
    ));
}

#[test]
fn can_format_and_reopen_image_file() {
    let disk = NamedTempFile::new().unwrap();
    let size = 256 * 4096;
    let mut image = DiskImageBuilder::from(disk.reopen().unwrap())
        .with_size(size)
        .build()
        .unwrap();
    dfs::format(image.buffer_mut(), size, 512).unwrap();
    dfs::append(image.buffer_mut(), "hello.txt", b"hello, world").unwrap();
    image.save().unwrap();

    let image = DiskImage::open(disk.path()).unwrap();
    let names: Vec<String> = entries(image.buffer()).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["root", "hello.txt"]);
    assert_eq!(
        dfs::read_file(image.buffer(), "hello.txt").unwrap(),
        b"hello, world".to_vec()
    );
}

#[test]
fn unformatted_image_has_invalid_signature() {
    let disk = NamedTempFile::new().unwrap();
    let image = DiskImageBuilder::from(disk.reopen().unwrap())
        .with_size(4096)
        .build()
        .unwrap();

    assert!(matches!(
        dfs::list(image.buffer()),
        Err(DfsError::InvalidSignature)
    ));
}
