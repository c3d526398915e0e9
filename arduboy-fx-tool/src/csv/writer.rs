use std::path::Path;

use arduboy_fx::HeaderCategory;
use csv::Writer;

use crate::error::Error;

/// Write scanned flashcart metadata to a CSV file at `output_path`.
///
/// Every category gets a row with an empty title, followed by one row per program in
/// flashcart order. Title images are not exported.
pub(crate) fn write_csv<P: AsRef<Path>>(
    categories: &[HeaderCategory],
    output_path: P,
) -> Result<(), Error> {
    let mut wtr = Writer::from_path(output_path)?;
    write_records(&mut wtr, categories)
}

/// Serialize scanned flashcart metadata to CSV and return the content as a `String`.
pub(crate) fn write_csv_content(categories: &[HeaderCategory]) -> Result<String, Error> {
    let mut wtr = Writer::from_writer(Vec::new());
    write_records(&mut wtr, categories)?;
    let bytes = wtr
        .into_inner()
        .map_err(|e| Error::IoError(e.into_error()))?;
    // Every field came from a Rust string.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_records<W: std::io::Write>(
    wtr: &mut Writer<W>,
    categories: &[HeaderCategory],
) -> Result<(), Error> {
    wtr.write_record([
        "category", "title", "version", "developer", "info", "sha256", "size",
    ])?;

    for category in categories {
        wtr.write_record([category.title.as_str(), "", "", "", &category.info, "", ""])?;
        for program in &category.slots {
            let size = program.total_size.to_string();
            wtr.write_record([
                category.title.as_str(),
                &program.title,
                &program.version,
                &program.developer,
                &program.info,
                &program.sha256,
                &size,
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}
