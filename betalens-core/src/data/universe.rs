//! Universe loading: the instrument list with display names and sectors.
//!
//! The universe file is a CSV with one row per instrument. Header names are
//! matched loosely, so both the exported spreadsheet headers
//! (`Accord Code`, `Company Name`, `Sector`) and snake_case forms work.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::ingest::{find_column, read_csv_as_text, text_column, CODE_HEADERS};
use super::provider::DataError;
use crate::domain::Instrument;

pub const NAME_HEADERS: &[&str] = &["company_name", "name", "display_name"];
pub const SECTOR_HEADERS: &[&str] = &["sector", "industry"];

/// Sector label given to rows with a blank sector cell.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Load universe rows in file order. Duplicate codes are kept here and
/// rejected when the table is validated.
pub fn load_universe(path: &Path) -> Result<Vec<Instrument>, DataError> {
    let df = read_csv_as_text(path)?;
    let codes = text_column(&df, path, CODE_HEADERS)?;
    let sectors = text_column(&df, path, SECTOR_HEADERS)?;
    let names = match find_column(&df, NAME_HEADERS) {
        Some(_) => Some(text_column(&df, path, NAME_HEADERS)?),
        None => None,
    };

    let mut instruments = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let code = codes.get(row).map(str::trim).unwrap_or_default();
        if code.is_empty() {
            return Err(DataError::EmptyCode {
                path: path.display().to_string(),
                row: row + 2,
            });
        }
        let name = names
            .and_then(|n| n.get(row))
            .map(str::trim)
            .unwrap_or_default();
        let sector = sectors
            .get(row)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNCLASSIFIED);
        instruments.push(Instrument::new(code, name, sector));
    }

    debug!(path = %path.display(), instruments = instruments.len(), "universe loaded");
    Ok(instruments)
}

/// Instrument count per sector label.
pub fn sector_counts(instruments: &[Instrument]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for inst in instruments {
        *counts.entry(inst.sector.as_str()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn reads_spreadsheet_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe.csv");
        fs::write(
            &path,
            "Accord Code,Company Name,Sector\nX1, Acme Ltd ,Industrials\nX2,Beta Corp,\n",
        )
        .unwrap();

        let universe = load_universe(&path).unwrap();
        assert_eq!(universe.len(), 2);
        assert_eq!(universe[0].code.as_str(), "X1");
        assert_eq!(universe[0].name, "Acme Ltd");
        assert_eq!(universe[1].sector, UNCLASSIFIED);

        let counts = sector_counts(&universe);
        assert_eq!(counts["Industrials"], 1);
    }

    #[test]
    fn name_column_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe.csv");
        fs::write(&path, "code,sector\nX1,Energy\n").unwrap();
        let universe = load_universe(&path).unwrap();
        assert_eq!(universe[0].name, "");
    }

    #[test]
    fn missing_code_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("universe.csv");
        fs::write(&path, "ticker,sector\nX1,Energy\n").unwrap();
        assert!(matches!(
            load_universe(&path),
            Err(DataError::MissingColumn { .. })
        ));
    }
}
