//! Unit conversion commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use medlink_types::{MeasurementUnit, convert_unit};

use crate::util::write_output;

pub fn cmd_convert(value: f64, from: &str, to: &str, output: Option<&PathBuf>) -> Result<()> {
    let from_unit: MeasurementUnit = from.parse().context("Invalid source unit")?;
    let to_unit: MeasurementUnit = to.parse().context("Invalid target unit")?;
    let converted = convert_unit(value, from_unit, to_unit)
        .with_context(|| format!("Cannot convert {value} {from_unit}"))?;

    write_output(output, &format!("{value} {from_unit} = {converted} {to_unit}\n"))
}

pub fn cmd_units(output: Option<&PathBuf>) -> Result<()> {
    let mut content = String::new();
    let mut current = None;
    for unit in MeasurementUnit::ALL {
        let dimension = unit.dimension();
        if current != Some(dimension) {
            content.push_str(&format!("{dimension:?}:\n"));
            current = Some(dimension);
        }
        content.push_str(&format!("  {unit}\n"));
    }
    write_output(output, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_convert(value: f64, from: &str, to: &str) -> Result<String> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.txt");
        cmd_convert(value, from, to, Some(&path))?;
        Ok(std::fs::read_to_string(&path)?)
    }

    #[test]
    fn test_convert_glucose() {
        let out = run_convert(5.0, "millimoles_per_liter", "MILLIGRAMS_PER_DECILITER").unwrap();
        let rest = out.strip_prefix("5 MILLIMOLES_PER_LITER = ").unwrap();
        let number: f64 = rest.split_whitespace().next().unwrap().parse().unwrap();
        assert!((number - 90.0).abs() < 1e-9);
        assert!(out.ends_with(" MILLIGRAMS_PER_DECILITER\n"));
    }

    #[test]
    fn test_convert_temperature() {
        let out = run_convert(-40.0, "CELSIUS", "FAHRENHEIT").unwrap();
        assert_eq!(out, "-40 CELSIUS = -40 FAHRENHEIT\n");
    }

    #[test]
    fn test_convert_rejects_incompatible_units() {
        let err = run_convert(1.0, "GRAMS", "MILES").unwrap_err();
        assert!(format!("{err:#}").contains("GRAMS"));
    }

    #[test]
    fn test_convert_rejects_unknown_unit() {
        let err = run_convert(1.0, "STONE", "GRAMS").unwrap_err();
        assert!(format!("{err:#}").contains("STONE"));
    }

    #[test]
    fn test_units_lists_every_unit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.txt");
        cmd_units(Some(&path)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        for unit in MeasurementUnit::ALL {
            assert!(content.contains(unit.as_str()), "missing {unit}");
        }
        assert!(content.contains("GlucoseConcentration:"));
    }
}
