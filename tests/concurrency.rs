extern crate tiff_container;

use std::io::Write;
use std::sync::Arc;
use std::thread;

use futures::io::Cursor;
use tiff_container::content::{
    AsyncStreamSource, AsyncStreamWriter, CancellationToken, FileSource, MemorySource,
    MemoryWriter,
};
use tiff_container::decoder::TiffFileReader;
use tiff_container::encoder::{TiffFileWriter, WriterOptions};
use tiff_container::field::kinds;
use tiff_container::tags::Tag;
use tiff_container::TiffError;

const PAGES: u32 = 4;

/// A chain of directories, each with a distinct out-of-line strip table.
fn paged_file() -> Vec<u8> {
    let mut writer = TiffFileWriter::new(MemoryWriter::new(), WriterOptions::default());
    for page in 0..PAGES {
        let offsets: Vec<u32> = (0..16).map(|i| page * 1000 + i).collect();
        let mut dir = writer.create_directory().unwrap();
        dir.write_long(Tag::ImageWidth, &[page]).unwrap();
        dir.write_long(Tag::StripOffsets, &offsets).unwrap();
        dir.flush().unwrap();
    }
    writer.flush().unwrap();
    writer.into_inner().into_inner()
}

fn check_page(reader: &TiffFileReader, directory_index: usize) {
    let directories = reader.read_directories().unwrap();
    let directory = &directories[directory_index];
    let mut fields = reader.create_field_reader().unwrap();
    let page = fields
        .read_tag::<kinds::Long>(directory, Tag::ImageWidth, None)
        .unwrap()[0];
    let offsets = fields
        .read_tag::<kinds::Long>(directory, Tag::StripOffsets, None)
        .unwrap();
    assert_eq!(page as usize, directory_index);
    assert!(offsets.iter().copied().eq((0..16).map(|i| page * 1000 + i)));
    fields.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_tasks_share_a_reader() {
    let cancel = CancellationToken::new();
    let reader = Arc::new(
        TiffFileReader::open_async(MemorySource::new(paged_file()), &cancel)
            .await
            .unwrap(),
    );

    let mut tasks = Vec::new();
    for task in 0..2u32 {
        let reader = Arc::clone(&reader);
        tasks.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let directories = reader.read_directories_async(&cancel).await?;
            let mut fields = reader.create_field_reader_async(&cancel).await?;
            let mut widths = Vec::new();
            for directory in directories.iter().skip(task as usize) {
                let width = fields
                    .read_tag_async::<kinds::Long>(directory, Tag::ImageWidth, None, &cancel)
                    .await?;
                widths.push(width[0]);
            }
            fields.close();
            Ok::<_, TiffError>(widths)
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }
    assert_eq!(results[0], vec![0, 1, 2, 3]);
    assert_eq!(results[1], vec![1, 2, 3]);
}

#[test]
fn threads_read_a_file_concurrently() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&paged_file()).unwrap();
    file.flush().unwrap();

    let source = FileSource::open(file.path()).unwrap();
    let reader = Arc::new(TiffFileReader::open(source).unwrap());

    let handles: Vec<_> = (0..PAGES as usize)
        .map(|index| {
            let reader = Arc::clone(&reader);
            thread::spawn(move || check_page(&reader, index))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    reader.dispose();
    assert!(reader.create_field_reader().is_err());
}

#[tokio::test]
async fn cancelled_operations_issue_no_io() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let opened = TiffFileReader::open_async(MemorySource::new(paged_file()), &cancel).await;
    assert!(matches!(opened, Err(TiffError::Cancelled)));

    let reader = TiffFileReader::open(MemorySource::new(paged_file())).unwrap();
    assert!(matches!(
        reader.read_first_directory_async(&cancel).await,
        Err(TiffError::Cancelled)
    ));

    let mut writer = TiffFileWriter::new(MemoryWriter::new(), WriterOptions::default());
    let mut dir = writer.create_directory().unwrap();
    let strips: Vec<u32> = (0..8).collect();
    assert!(matches!(
        dir.write_long_async(Tag::StripOffsets, &strips, &cancel).await,
        Err(TiffError::Cancelled)
    ));
    assert!(!dir.contains(Tag::StripOffsets));
}

#[tokio::test]
async fn async_stream_round_trip() {
    let cancel = CancellationToken::new();
    let options = WriterOptions::default().big_endian().bigtiff(true);
    let mut writer = TiffFileWriter::new(AsyncStreamWriter::new(Cursor::new(Vec::new())), options);

    for page in 0..2u64 {
        let mut dir = writer.create_directory().unwrap();
        dir.write_long8_async(Tag::TileOffsets, &[page, page << 40, 3], &cancel)
            .await
            .unwrap();
        dir.write_ascii_async(Tag::Software, &["async", "writer"], &cancel)
            .await
            .unwrap();
        dir.flush_async(&cancel).await.unwrap();
    }
    writer.flush_async(&cancel).await.unwrap();
    assert!(writer.flush_async(&cancel).await.is_err());

    let bytes = writer.into_inner().into_inner().unwrap().into_inner();
    let source = AsyncStreamSource::new(Cursor::new(bytes));
    let reader = TiffFileReader::open_async(source, &cancel).await.unwrap();
    assert!(reader.header().is_bigtiff());

    let directories = reader.read_directories_async(&cancel).await.unwrap();
    assert_eq!(directories.len(), 2);

    let mut fields = reader.create_field_reader_async(&cancel).await.unwrap();
    for (page, directory) in directories.iter().enumerate() {
        let page = page as u64;
        let tiles = fields
            .read_tag_async::<kinds::Long8>(directory, Tag::TileOffsets, None, &cancel)
            .await
            .unwrap();
        assert_eq!(tiles.as_slice(), &[page, page << 40, 3]);

        let software = directory.find(Tag::Software).unwrap();
        let software = fields
            .read_ascii_field_async(software, None, false, &cancel)
            .await
            .unwrap();
        assert_eq!(software.as_slice(), &["async", "writer"]);
    }
}
