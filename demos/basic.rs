//! Basic usage example for HosDb
//!
//! This example demonstrates the fundamental operations:
//! - Writing object metadata into a data file
//! - Building the hash index
//! - Random lookups and a sequential scan
//! - Appending to an existing file

use hosdb::{HosReader, HosWriter, LogEntry, ObjectMeta, Options};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let path = std::env::temp_dir().join("hosdb_example.hos");

    // Configure writer options
    let options = Options::default().max_block_size(16 * 1024).fsync(true);

    println!("Writing data...");
    let mut writer = HosWriter::create(&path, options.clone())?;
    for id in 0..100u64 {
        writer.put_object(&format!("object/{}", id), &ObjectMeta::new(id, id * 4096))?;
    }
    writer.put_str("note", "first version")?;
    writer.delete_str("object/7")?;

    let info = writer.build_index()?;
    println!(
        "Indexed {} records ({} live) in {} slots",
        info.num_records, info.num_live, info.slot_count
    );
    writer.close()?;

    // Random lookups
    println!("Reading data...");
    let reader = HosReader::open(&path)?;
    if let Some(meta) = reader.get_object("object/42")? {
        println!("object/42 => {}", meta);
    }
    match reader.get_object("object/7")? {
        Some(_) => println!("object/7 still exists (unexpected)"),
        None => println!("object/7 was successfully deleted"),
    }
    drop(reader);

    // Append a newer version and re-index
    println!("Appending...");
    let mut writer = HosWriter::append(&path, options)?;
    writer.put_str("note", "second version")?;
    writer.build_index()?;
    writer.close()?;

    let reader = HosReader::open(&path)?;
    println!("note => {:?}", reader.get_str("note")?);

    // Sequential scan in write order
    let mut puts = 0;
    let mut deletes = 0;
    for entry in reader.entries()? {
        match entry? {
            LogEntry::Put { .. } => puts += 1,
            LogEntry::Delete { .. } => deletes += 1,
        }
    }
    println!("Scanned {} puts and {} deletes", puts, deletes);

    std::fs::remove_file(&path)?;
    println!("Data file removed");

    Ok(())
}
