//! Cp command - copy one resource's content to another.

use std::io::Write;

use strata::resource::copy_via_streams;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Copy `source` to `destination`, creating or replacing it.
pub fn run(
    runner: &CliRunner,
    source: &str,
    destination: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let src = runner.resolve(source)?;
    let dst = runner.resolve(destination)?;

    let bytes = copy_via_streams(src.as_ref(), dst.as_ref())?;
    writeln!(out, "Copied {} bytes: {} -> {}", bytes, src.uri(), dst.uri())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use strata::Resource;
    use tempfile::TempDir;

    #[test]
    fn test_cp_archive_entry_to_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.ini");
        fs::write(&config, "").unwrap();

        let zip_path = temp.path().join("bundle.zip");
        {
            let mut writer = zip_writer(&zip_path);
            writer
                .start_file("notes.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"from the archive").unwrap();
            writer.finish().unwrap();
        }
        let runner = CliRunner::new(Some(&config), &[]).unwrap();
        let source = format!(
            "jar:{}!/notes.txt",
            strata::backend::FileResource::new(&zip_path).unwrap().uri()
        );
        let dest = temp.path().join("out/notes.txt");

        let mut out = Vec::new();
        run(&runner, &source, dest.to_str().unwrap(), &mut out).unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "from the archive");
        assert!(String::from_utf8(out).unwrap().starts_with("Copied 16 bytes"));
    }

    fn zip_writer(path: &std::path::Path) -> zip::ZipWriter<fs::File> {
        zip::ZipWriter::new(fs::File::create(path).unwrap())
    }
}
