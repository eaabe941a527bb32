use serde::Serialize;

/// one parsed sample of the five sensor channels
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// temperature in celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// raw light level (ldr)
    pub light: i64,
    /// raw gas level (mq135)
    pub gas_level: i64,
    /// raw rain sensor level
    pub rain: i64,
}

/// advisory labels for one reading, in evaluation order
pub type AlertSet = Vec<String>;

/// the unit broadcast to observers
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryEvent {
    pub reading: Reading,
    pub alerts: AlertSet,
}

/// wire form of a telemetry event (`sensor_data` payload)
///
/// the gas reading keeps the board's sensor name, `mq135`.
#[derive(Clone, Debug, Serialize)]
pub struct SensorData<'a> {
    pub temperature: f64,
    pub humidity: f64,
    pub light: i64,
    pub mq135: i64,
    pub rain: i64,
    pub alerts: &'a [String],
}

impl TelemetryEvent {
    pub fn new(reading: Reading, alerts: AlertSet) -> Self {
        Self { reading, alerts }
    }

    pub fn sensor_data(&self) -> SensorData<'_> {
        SensorData {
            temperature: self.reading.temperature,
            humidity: self.reading.humidity,
            light: self.reading.light,
            mq135: self.reading.gas_level,
            rain: self.reading.rain,
            alerts: &self.alerts,
        }
    }
}

/// fixed operator directives understood by the board
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Retract,
    Reverse,
    SteamerOn,
}

impl Command {
    #[cfg(test)]
    pub const ALL: [Command; 3] = [Command::Retract, Command::Reverse, Command::SteamerOn];

    /// map an inbound observer event name to a command
    pub fn from_event(name: &str) -> Option<Self> {
        match name {
            "manual_retract" => Some(Command::Retract),
            "manual_reverse" => Some(Command::Reverse),
            "steamer_on" => Some(Command::SteamerOn),
            _ => None,
        }
    }

    pub fn event_name(self) -> &'static str {
        match self {
            Command::Retract => "manual_retract",
            Command::Reverse => "manual_reverse",
            Command::SteamerOn => "steamer_on",
        }
    }

    /// newline-terminated ascii token written to the serial link
    pub fn token(self) -> &'static [u8] {
        match self {
            Command::Retract => b"RETRACT\n",
            Command::Reverse => b"REVERSE\n",
            Command::SteamerOn => b"STEAMER_ON\n",
        }
    }
}
