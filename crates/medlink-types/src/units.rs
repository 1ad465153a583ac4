//! Measurement units and conversion between them.
//!
//! Units are grouped by the quantity they measure. Conversion is only
//! defined inside a group; every group except temperature is linear around
//! a base unit.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Milligrams per decilitre in one millimole per litre of glucose.
pub const GLUCOSE_MG_DL_PER_MMOL_L: f64 = 18.0;

/// Quantity measured by a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Ratio,
    Frequency,
    Mass,
    Length,
    Volume,
    GlucoseConcentration,
    Pressure,
    Power,
    Energy,
    Temperature,
    Speed,
}

/// A unit a device reading can be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeasurementUnit {
    Percentage,
    BeatsPerMinute,
    Micrograms,
    Milligrams,
    Grams,
    Kilograms,
    Ounces,
    Pounds,
    Centimeters,
    Meters,
    Kilometers,
    Miles,
    Inches,
    Feet,
    Liters,
    Milliliters,
    FluidOuncesUs,
    MillimolesPerLiter,
    MilligramsPerDeciliter,
    MillimetersOfMercury,
    Watts,
    KilocaloriesPerDay,
    Calories,
    Kilocalories,
    Joules,
    Kilojoules,
    Celsius,
    Fahrenheit,
    MetersPerSecond,
    KilometersPerHour,
    MilesPerHour,
}

impl MeasurementUnit {
    /// Every unit, in declaration order.
    pub const ALL: [MeasurementUnit; 31] = [
        MeasurementUnit::Percentage,
        MeasurementUnit::BeatsPerMinute,
        MeasurementUnit::Micrograms,
        MeasurementUnit::Milligrams,
        MeasurementUnit::Grams,
        MeasurementUnit::Kilograms,
        MeasurementUnit::Ounces,
        MeasurementUnit::Pounds,
        MeasurementUnit::Centimeters,
        MeasurementUnit::Meters,
        MeasurementUnit::Kilometers,
        MeasurementUnit::Miles,
        MeasurementUnit::Inches,
        MeasurementUnit::Feet,
        MeasurementUnit::Liters,
        MeasurementUnit::Milliliters,
        MeasurementUnit::FluidOuncesUs,
        MeasurementUnit::MillimolesPerLiter,
        MeasurementUnit::MilligramsPerDeciliter,
        MeasurementUnit::MillimetersOfMercury,
        MeasurementUnit::Watts,
        MeasurementUnit::KilocaloriesPerDay,
        MeasurementUnit::Calories,
        MeasurementUnit::Kilocalories,
        MeasurementUnit::Joules,
        MeasurementUnit::Kilojoules,
        MeasurementUnit::Celsius,
        MeasurementUnit::Fahrenheit,
        MeasurementUnit::MetersPerSecond,
        MeasurementUnit::KilometersPerHour,
        MeasurementUnit::MilesPerHour,
    ];

    /// The identifier used on the command surface.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementUnit::Percentage => "PERCENTAGE",
            MeasurementUnit::BeatsPerMinute => "BEATS_PER_MINUTE",
            MeasurementUnit::Micrograms => "MICROGRAMS",
            MeasurementUnit::Milligrams => "MILLIGRAMS",
            MeasurementUnit::Grams => "GRAMS",
            MeasurementUnit::Kilograms => "KILOGRAMS",
            MeasurementUnit::Ounces => "OUNCES",
            MeasurementUnit::Pounds => "POUNDS",
            MeasurementUnit::Centimeters => "CENTIMETERS",
            MeasurementUnit::Meters => "METERS",
            MeasurementUnit::Kilometers => "KILOMETERS",
            MeasurementUnit::Miles => "MILES",
            MeasurementUnit::Inches => "INCHES",
            MeasurementUnit::Feet => "FEET",
            MeasurementUnit::Liters => "LITERS",
            MeasurementUnit::Milliliters => "MILLILITERS",
            MeasurementUnit::FluidOuncesUs => "FLUID_OUNCES_US",
            MeasurementUnit::MillimolesPerLiter => "MILLIMOLES_PER_LITER",
            MeasurementUnit::MilligramsPerDeciliter => "MILLIGRAMS_PER_DECILITER",
            MeasurementUnit::MillimetersOfMercury => "MILLIMETERS_OF_MERCURY",
            MeasurementUnit::Watts => "WATTS",
            MeasurementUnit::KilocaloriesPerDay => "KILOCALORIES_PER_DAY",
            MeasurementUnit::Calories => "CALORIES",
            MeasurementUnit::Kilocalories => "KILOCALORIES",
            MeasurementUnit::Joules => "JOULES",
            MeasurementUnit::Kilojoules => "KILOJOULES",
            MeasurementUnit::Celsius => "CELSIUS",
            MeasurementUnit::Fahrenheit => "FAHRENHEIT",
            MeasurementUnit::MetersPerSecond => "METERS_PER_SECOND",
            MeasurementUnit::KilometersPerHour => "KILOMETERS_PER_HOUR",
            MeasurementUnit::MilesPerHour => "MILES_PER_HOUR",
        }
    }

    /// The quantity this unit measures.
    #[must_use]
    pub fn dimension(&self) -> Dimension {
        use MeasurementUnit::*;
        match self {
            Percentage => Dimension::Ratio,
            BeatsPerMinute => Dimension::Frequency,
            Micrograms | Milligrams | Grams | Kilograms | Ounces | Pounds => Dimension::Mass,
            Centimeters | Meters | Kilometers | Miles | Inches | Feet => Dimension::Length,
            Liters | Milliliters | FluidOuncesUs => Dimension::Volume,
            MillimolesPerLiter | MilligramsPerDeciliter => Dimension::GlucoseConcentration,
            MillimetersOfMercury => Dimension::Pressure,
            Watts | KilocaloriesPerDay => Dimension::Power,
            Calories | Kilocalories | Joules | Kilojoules => Dimension::Energy,
            Celsius | Fahrenheit => Dimension::Temperature,
            MetersPerSecond | KilometersPerHour | MilesPerHour => Dimension::Speed,
        }
    }

    /// How many base units of the dimension one of this unit is.
    ///
    /// Base units: grams, metres, litres, mmol/L, watts, joules, m/s.
    /// Temperature is affine and handled separately.
    fn base_factor(&self) -> f64 {
        use MeasurementUnit::*;
        match self {
            Percentage | BeatsPerMinute | MillimetersOfMercury => 1.0,
            Micrograms => 1e-6,
            Milligrams => 1e-3,
            Grams => 1.0,
            Kilograms => 1e3,
            Ounces => 28.349_523_125,
            Pounds => 453.592_37,
            Centimeters => 0.01,
            Meters => 1.0,
            Kilometers => 1e3,
            Miles => 1_609.344,
            Inches => 0.0254,
            Feet => 0.3048,
            Liters => 1.0,
            Milliliters => 1e-3,
            FluidOuncesUs => 0.029_573_529_562_5,
            MillimolesPerLiter => 1.0,
            MilligramsPerDeciliter => 1.0 / GLUCOSE_MG_DL_PER_MMOL_L,
            Watts => 1.0,
            KilocaloriesPerDay => 4_184.0 / 86_400.0,
            Calories => 4.184,
            Kilocalories => 4_184.0,
            Joules => 1.0,
            Kilojoules => 1e3,
            Celsius | Fahrenheit => 1.0,
            MetersPerSecond => 1.0,
            KilometersPerHour => 1.0 / 3.6,
            MilesPerHour => 0.447_04,
        }
    }
}

impl FromStr for MeasurementUnit {
    type Err = ParseError;

    /// Parse a unit identifier, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MeasurementUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::UnknownUnit(s.to_string()))
    }
}

impl fmt::Display for MeasurementUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert `value` from one unit to another of the same dimension.
///
/// # Errors
///
/// Returns [`ParseError::IncompatibleUnits`] when the units measure different
/// quantities and [`ParseError::InvalidValue`] for non-finite input.
///
/// ```
/// use medlink_types::{MeasurementUnit, convert_unit};
///
/// let mg_dl = convert_unit(5.5, MeasurementUnit::MillimolesPerLiter,
///     MeasurementUnit::MilligramsPerDeciliter).unwrap();
/// assert!((mg_dl - 99.0).abs() < 1e-9);
///
/// assert!(convert_unit(1.0, MeasurementUnit::Grams, MeasurementUnit::Meters).is_err());
/// ```
pub fn convert_unit(
    value: f64,
    from: MeasurementUnit,
    to: MeasurementUnit,
) -> Result<f64, ParseError> {
    if !value.is_finite() {
        return Err(ParseError::InvalidValue(format!(
            "cannot convert non-finite value {value}"
        )));
    }
    if from.dimension() != to.dimension() {
        return Err(ParseError::IncompatibleUnits {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
    }
    if from == to {
        return Ok(value);
    }

    if from.dimension() == Dimension::Temperature {
        let celsius = match from {
            MeasurementUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            _ => value,
        };
        return Ok(match to {
            MeasurementUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            _ => celsius,
        });
    }

    Ok(value * from.base_factor() / to.base_factor())
}
