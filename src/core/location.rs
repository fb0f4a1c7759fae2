//! Named Locations
//!
//! Locations are opaque to the match core except for their config codec:
//! a comma-separated tuple `x,y,z[,yaw,pitch[,world]]`, with every number
//! written to two decimal places (trailing zeros dropped).

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// A point in a world, with optional facing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
    /// Horizontal facing in degrees.
    pub yaw: f32,
    /// Vertical facing in degrees.
    pub pitch: f32,
    /// World name, if the tuple carried one.
    pub world: Option<String>,
}

/// Location parsing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// Fewer than three components.
    #[error("A location must be at least (x,y,z), got '{0}'")]
    TooFewParts(String),

    /// Four components: yaw without pitch.
    #[error("Expected location of type (x,y,z,yaw,pitch), got '{0}'")]
    MissingPitch(String),

    /// More than six components.
    #[error("Expected location of type (x,y,z,yaw,pitch,world), got '{0}'")]
    TooManyParts(String),

    /// A numeric component failed to parse.
    #[error("Invalid number '{0}' in location")]
    InvalidNumber(String),
}

impl Location {
    /// Location without facing.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, yaw: 0.0, pitch: 0.0, world: None }
    }

    /// Location with facing and world.
    pub fn with_facing(x: f64, y: f64, z: f64, yaw: f32, pitch: f32, world: impl Into<String>) -> Self {
        Self { x, y, z, yaw, pitch, world: Some(world.into()) }
    }

    /// Fill in the world when the tuple did not name one.
    pub fn in_world(mut self, world: &str) -> Self {
        if self.world.is_none() {
            self.world = Some(world.to_string());
        }
        self
    }

    /// Serialize to the config tuple form.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Parse from the config tuple form.
    pub fn deserialize(value: &str) -> Result<Self, LocationError> {
        value.parse()
    }
}

/// Two decimal places, trailing zeros and a dangling point removed.
fn to_hundredths(value: f64) -> String {
    let mut s = format!("{:.2}", value);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

fn parse_number(part: &str) -> Result<f64, LocationError> {
    part.trim()
        .parse::<f64>()
        .map_err(|_| LocationError::InvalidNumber(part.trim().to_string()))
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            to_hundredths(self.x),
            to_hundredths(self.y),
            to_hundredths(self.z),
            to_hundredths(self.yaw as f64),
            to_hundredths(self.pitch as f64),
        )?;
        if let Some(world) = &self.world {
            write!(f, ",{}", world)?;
        }
        Ok(())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(',').collect();
        match parts.len() {
            0..=2 => return Err(LocationError::TooFewParts(value.to_string())),
            4 => return Err(LocationError::MissingPitch(value.to_string())),
            n if n > 6 => return Err(LocationError::TooManyParts(value.to_string())),
            _ => {}
        }

        let x = parse_number(parts[0])?;
        let y = parse_number(parts[1])?;
        let z = parse_number(parts[2])?;
        let mut location = Location::new(x, y, z);

        if parts.len() >= 5 {
            location.yaw = parse_number(parts[3])? as f32;
            location.pitch = parse_number(parts[4])? as f32;
        }
        if parts.len() == 6 {
            let world = parts[5].trim();
            if !world.is_empty() {
                location.world = Some(world.to_string());
            }
        }

        Ok(location)
    }
}
