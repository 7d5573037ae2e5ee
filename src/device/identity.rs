//! Device identity - the payload of the `init` message
//!
//! Describes what the device is (output kind) and what it can report
//! (buttons, binary inputs, sensors). Indices of the declared lists are the
//! `index` values used by later events.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::message::finite;

/// Output behaviour of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputKind {
    /// Single-channel light
    Light,
    /// Multi-channel color light
    ColorLight,
    /// Color light with position channels
    MovingLight,
    /// Climate control valve
    HeatingValve,
    /// Blinds/jalousie
    Shadow,
    /// Generic switched output
    Basic,
    /// Any kind not known here, passed through as-is
    Other(String),
}

impl OutputKind {
    /// Wire name of the output kind
    pub fn as_str(&self) -> &str {
        match self {
            OutputKind::Light => "light",
            OutputKind::ColorLight => "colorlight",
            OutputKind::MovingLight => "movinglight",
            OutputKind::HeatingValve => "heatingvalve",
            OutputKind::Shadow => "shadow",
            OutputKind::Basic => "basic",
            OutputKind::Other(s) => s,
        }
    }
}

impl From<String> for OutputKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "light" => OutputKind::Light,
            "colorlight" => OutputKind::ColorLight,
            "movinglight" => OutputKind::MovingLight,
            "heatingvalve" => OutputKind::HeatingValve,
            "shadow" => OutputKind::Shadow,
            "basic" => OutputKind::Basic,
            _ => OutputKind::Other(s),
        }
    }
}

impl From<OutputKind> for String {
    fn from(kind: OutputKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::str::FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::InvalidInput("output kind must not be empty".into()));
        }
        Ok(OutputKind::from(s.to_lowercase()))
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSpec {
    /// Hardware button type (1 = single push button)
    #[serde(rename = "buttontype")]
    pub button_type: i32,
    /// Human-readable name
    #[serde(rename = "hardwarename")]
    pub hardware_name: String,
    /// Button element (0 = center, for multi-element rockers the part)
    pub element: i32,
    /// Button id for buttons made of several elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    /// Group override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
}

impl ButtonSpec {
    /// Create a button declaration
    pub fn new(button_type: i32, hardware_name: impl Into<String>, element: i32) -> Self {
        ButtonSpec {
            button_type,
            hardware_name: hardware_name.into(),
            element,
            id: None,
            group: None,
        }
    }

    /// Single push button, the most common case
    pub fn push(hardware_name: impl Into<String>) -> Self {
        Self::new(1, hardware_name, 0)
    }

    /// Set the group
    pub fn with_group(mut self, group: i32) -> Self {
        self.group = Some(group);
        self
    }

    /// Set the button id
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }
}

/// A declared binary input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Binary input type
    #[serde(rename = "inputtype")]
    pub input_type: i32,
    /// Usage hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<i32>,
    /// Group override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    /// Expected update interval in seconds
    #[serde(
        rename = "updateinterval",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_interval: Option<f64>,
    /// Human-readable name
    #[serde(
        rename = "hardwarename",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hardware_name: Option<String>,
}

impl InputSpec {
    /// Create a binary input declaration
    pub fn new(input_type: i32) -> Self {
        InputSpec {
            input_type,
            usage: None,
            group: None,
            update_interval: None,
            hardware_name: None,
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.hardware_name = Some(name.into());
        self
    }

    /// Set the expected update interval
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval.as_secs_f64());
        self
    }
}

/// A declared sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Sensor type
    #[serde(rename = "sensortype")]
    pub sensor_type: i32,
    /// Usage hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<i32>,
    /// Group override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    /// Expected update interval in seconds
    #[serde(
        rename = "updateinterval",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_interval: Option<f64>,
    /// Human-readable name
    #[serde(
        rename = "hardwarename",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hardware_name: Option<String>,
    /// Lowest reportable value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Highest reportable value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Value resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
}

impl SensorSpec {
    /// Create a sensor declaration
    pub fn new(sensor_type: i32) -> Self {
        SensorSpec {
            sensor_type,
            usage: None,
            group: None,
            update_interval: None,
            hardware_name: None,
            min: None,
            max: None,
            resolution: None,
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.hardware_name = Some(name.into());
        self
    }

    /// Set value range and resolution
    pub fn with_range(mut self, min: f64, max: f64, resolution: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self.resolution = Some(resolution);
        self
    }

    fn ensure_finite(&self) -> Result<()> {
        let fields = [
            ("sensor updateinterval", self.update_interval),
            ("sensor min", self.min),
            ("sensor max", self.max),
            ("sensor resolution", self.resolution),
        ];
        for (what, value) in fields {
            if let Some(v) = value {
                finite(what, v)?;
            }
        }
        Ok(())
    }
}

/// Everything a device announces in its `init` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Unique id (a dSUID, a UUID, or any string the controller hashes)
    #[serde(rename = "uniqueid")]
    pub unique_id: String,
    /// Output behaviour; `None` for input-only devices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputKind>,
    /// Declared buttons, index = position
    #[serde(default)]
    pub buttons: Vec<ButtonSpec>,
    /// Declared binary inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,
    /// Declared sensors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<SensorSpec>,
    /// Default device name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Output hardware name (defaults to the output kind on the controller)
    #[serde(
        rename = "hardwarename",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub hardware_name: Option<String>,
    /// Primary group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
    /// Explicit group memberships of the output
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<i32>,
    /// Whether the output dims (default on the controller: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimmable: Option<bool>,
    /// Device answers `sync` requests with its channel values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync: Option<bool>,
    /// Device wants `move` commands instead of stepped values
    #[serde(rename = "move", default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<bool>,
    /// Protocol selector; this crate only speaks "json"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl DeviceIdentity {
    /// Create an identity with no buttons, inputs or sensors
    pub fn new(unique_id: impl Into<String>, output: Option<OutputKind>) -> Self {
        DeviceIdentity {
            unique_id: unique_id.into(),
            output,
            buttons: Vec::new(),
            inputs: Vec::new(),
            sensors: Vec::new(),
            name: None,
            hardware_name: None,
            group: None,
            groups: Vec::new(),
            dimmable: None,
            sync: None,
            movement: None,
            protocol: None,
        }
    }

    /// Add a button; its index is the number of buttons declared before it
    pub fn with_button(mut self, button: ButtonSpec) -> Self {
        self.buttons.push(button);
        self
    }

    /// Add a binary input
    pub fn with_input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add a sensor
    pub fn with_sensor(mut self, sensor: SensorSpec) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Set the default device name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the primary group
    pub fn with_group(mut self, group: i32) -> Self {
        self.group = Some(group);
        self
    }

    /// Set whether the output dims
    pub fn with_dimmable(mut self, dimmable: bool) -> Self {
        self.dimmable = Some(dimmable);
        self
    }

    /// Announce that the device answers `sync`
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Ask for `move` commands
    pub fn with_movement(mut self, movement: bool) -> Self {
        self.movement = Some(movement);
        self
    }

    /// Check the identity before sending it
    pub fn validate(&self) -> Result<()> {
        if self.unique_id.trim().is_empty() {
            return Err(Error::InvalidInput("missing 'uniqueid'".into()));
        }
        if let Some(protocol) = &self.protocol {
            if protocol != "json" {
                return Err(Error::InvalidInput(format!(
                    "unsupported protocol '{}', only \"json\" is spoken",
                    protocol
                )));
            }
        }
        self.ensure_finite()
    }

    pub(crate) fn ensure_finite(&self) -> Result<()> {
        for input in &self.inputs {
            if let Some(v) = input.update_interval {
                finite("input updateinterval", v)?;
            }
        }
        for sensor in &self.sensors {
            sensor.ensure_finite()?;
        }
        Ok(())
    }
}
