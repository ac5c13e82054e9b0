// Concurrent Access Tests for HosDb
// These tests verify shared readers and shared buffer pools across threads

use hosdb::{BufferPoolRegistry, HosReader, HosWriter, MemoryKind, Options};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

/// Test lookups on one reader from many threads
#[test]
fn test_concurrent_reads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.hos");

    let mut writer = HosWriter::create(&path, Options::default().max_block_size(512)).unwrap();
    for i in 0..1000 {
        writer.put_str(&format!("key_{}", i), &format!("value_{}", i)).unwrap();
    }
    writer.build_index().unwrap();
    writer.close().unwrap();

    let reader = Arc::new(HosReader::open(&path).unwrap());
    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let reader = Arc::clone(&reader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in (thread_id..1000).step_by(num_threads) {
                    let value = reader.get_str(&format!("key_{}", i)).unwrap();
                    assert_eq!(value, Some(format!("value_{}", i)));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

/// Test scanning while other threads look keys up
#[test]
fn test_concurrent_scan_and_lookup() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.hos");

    let mut writer = HosWriter::create(&path, Options::default()).unwrap();
    for i in 0..500 {
        writer.put_str(&format!("k{}", i), "v").unwrap();
    }
    writer.build_index().unwrap();
    writer.close().unwrap();

    let reader = Arc::new(HosReader::open(&path).unwrap());

    let scanner = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || reader.entries().unwrap().map(|e| e.unwrap()).count())
    };
    let looker = {
        let reader = Arc::clone(&reader);
        thread::spawn(move || (0..500).filter(|i| reader.contains(format!("k{}", i).as_bytes()).unwrap()).count())
    };

    assert_eq!(scanner.join().unwrap(), 500);
    assert_eq!(looker.join().unwrap(), 500);
}

/// Test writers on different threads sharing one pool registry
#[test]
fn test_writers_share_buffer_pools() {
    let dir = TempDir::new().unwrap();
    let pools = Arc::new(BufferPoolRegistry::new());
    let num_threads = 4;

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let path = dir.path().join(format!("data_{}.hos", thread_id));
            let options = Options::default().max_block_size(1024).buffer_pools(Arc::clone(&pools));
            thread::spawn(move || {
                let mut writer = HosWriter::create(&path, options).unwrap();
                for i in 0..200 {
                    writer.put_str(&format!("t{}_k{}", thread_id, i), "value").unwrap();
                }
                writer.build_index().unwrap();
                writer.close().unwrap();
                path
            })
        })
        .collect();

    let paths: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (thread_id, path) in paths.iter().enumerate() {
        let reader =
            HosReader::open_with_options(path, &Options::default().buffer_pools(Arc::clone(&pools)))
                .unwrap();
        assert_eq!(reader.get_str(&format!("t{}_k199", thread_id)).unwrap(), Some("value".to_string()));
    }

    // Index builds and lookups recycle block buffers, one per concurrent user at most.
    #[cfg(feature = "snappy")]
    assert!(pools.get(1024, MemoryKind::Heap).created() <= num_threads);
}

/// Test moving a writer to another thread
#[test]
fn test_writer_moves_between_threads() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.hos");

    let mut writer = HosWriter::create(&path, Options::default()).unwrap();
    writer.put_str("main", "1").unwrap();

    let mut writer = thread::spawn(move || {
        writer.put_str("worker", "2").unwrap();
        writer
    })
    .join()
    .unwrap();

    writer.build_index().unwrap();
    writer.close().unwrap();

    let reader = HosReader::open(&path).unwrap();
    assert_eq!(reader.get_str("main").unwrap(), Some("1".to_string()));
    assert_eq!(reader.get_str("worker").unwrap(), Some("2".to_string()));
}
