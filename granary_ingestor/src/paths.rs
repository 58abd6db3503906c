//! File and directory naming for temporary and finalised column files.
//!
//! Every worker reuses a single temporary slot,
//! `<target>/<instance>_<index>.tmp`. Finalised names embed the local
//! finalisation time down to the millisecond, so consecutive rollovers of
//! the same slot never collide. Downstream readers recognise complete
//! files purely by the extension.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

pub(crate) const TEMP_FILE_EXTENSION: &str = ".tmp";
pub(crate) const COLUMN_FILE_EXTENSION: &str = ".parquet";

const FILE_DATETIME_FORMAT: &str = "%Y%m%d-%H%M%S%3f";

/// The temporary slot of a worker.
pub(crate) fn temp_file_path(target: &Path, instance: &str, index: usize) -> PathBuf {
    target.join(format!("{instance}_{index}{TEMP_FILE_EXTENSION}"))
}

/// Name of a finalised column file.
pub(crate) fn final_file_name(now: DateTime<Local>, instance: &str, index: usize) -> String {
    format!(
        "{}_{instance}_{index}{COLUMN_FILE_EXTENSION}",
        now.format(FILE_DATETIME_FORMAT)
    )
}

/// Directory a finalised file lands in: a dated sub-directory when a
/// pattern is configured, the target itself otherwise.
pub(crate) fn destination_dir(
    target: &Path,
    pattern: Option<&str>,
    now: DateTime<Local>,
) -> PathBuf {
    match pattern {
        Some(pattern) => target.join(now.format(pattern).to_string()),
        None => target.to_path_buf(),
    }
}

/// Whether chrono can actually format with the given pattern.
pub(crate) fn is_valid_date_pattern(pattern: &str) -> bool {
    use chrono::format::{Item, StrftimeItems};
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_now() -> DateTime<Local> {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(14, 30, 5, 123)
            .unwrap()
            .and_local_timezone(Local)
            .single()
            .unwrap()
    }

    #[test]
    fn temp_path_is_per_worker() {
        let path = temp_file_path(Path::new("/data/out"), "ingest", 3);
        assert_eq!(path, PathBuf::from("/data/out/ingest_3.tmp"));
    }

    #[test]
    fn final_name_embeds_millisecond_timestamp() {
        let name = final_file_name(fixed_now(), "ingest", 3);
        assert_eq!(name, "20240305-143005123_ingest_3.parquet");
    }

    #[test]
    fn destination_honours_date_pattern() {
        let flat = destination_dir(Path::new("/data/out"), None, fixed_now());
        assert_eq!(flat, PathBuf::from("/data/out"));

        let dated = destination_dir(Path::new("/data/out"), Some("%Y/%m/%d"), fixed_now());
        assert_eq!(dated, PathBuf::from("/data/out/2024/03/05"));
    }

    #[test]
    fn date_pattern_validation() {
        assert!(is_valid_date_pattern("%Y-%m-%d"));
        assert!(is_valid_date_pattern("%Y/%m"));
        assert!(!is_valid_date_pattern("%Q"));
    }
}
