//! Static register schema for the DVI LV12 heat-pump controller.
//!
//! The controller exposes three kinds of state:
//!
//! - **Coils** (FC01): status bits read in one 14-bit window starting at coil 1.
//!   Bit 13 is not wired to anything on this controller and is never named.
//! - **Input registers** (FC04): sensor values. The whole 0x01..=0x0E window is
//!   polled to keep the transaction pattern uniform, but only the named
//!   addresses are published.
//! - **Echo registers** (FC06): settings registers with no holding-register read
//!   path; their current value is recovered from the echo of a zero-delta write
//!   (see [`crate::protocol::echo_read`]).
//!
//! The `unit` and `device_class` fields are inert metadata for external
//! discovery tooling; the bridge itself never reads them.

use std::ops::RangeInclusive;

/// A named status bit in the coil window.
#[derive(Debug, Clone, Copy)]
pub struct CoilDef {
    /// Bit position in the decoded 16-bit mask.
    pub bit: u8,
    pub label: &'static str,
    /// Inert metadata for discovery tooling.
    pub device_class: Option<&'static str>,
}

/// A published FC04 input register.
#[derive(Debug, Clone, Copy)]
pub struct InputDef {
    pub address: u16,
    pub label: &'static str,
    pub scale: f64,
    pub decimals: i32,
    /// Inert metadata for discovery tooling.
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

/// Scaling override for an echo register.
#[derive(Debug, Clone, Copy)]
pub struct Adjust {
    pub multiplier: f64,
    pub decimals: i32,
}

/// An FC06 echo-read register. Without an [`Adjust`] entry the raw value is
/// published unchanged.
#[derive(Debug, Clone, Copy)]
pub struct EchoDef {
    pub address: u16,
    pub label: &'static str,
    pub adjust: Option<Adjust>,
}

/// A 32-bit big-endian accumulator spread over two adjacent input registers.
#[derive(Debug, Clone, Copy)]
pub struct AccumulatorDef {
    /// High word address.
    pub high: u16,
    /// Low word address.
    pub low: u16,
    pub label: &'static str,
    pub scale: f64,
    pub decimals: i32,
}

/// A writable register behind a command topic.
#[derive(Debug, Clone, Copy)]
pub struct CommandDef {
    pub topic: &'static str,
    pub address: u16,
    pub scale: u16,
}

/// Immutable register schema, built once at startup.
#[derive(Debug)]
pub struct RegisterSchema {
    coils: Vec<CoilDef>,
    inputs: Vec<InputDef>,
    input_window: RangeInclusive<u16>,
    power: InputDef,
    energy: AccumulatorDef,
    echoes: Vec<EchoDef>,
    commands: Vec<CommandDef>,
}

impl RegisterSchema {
    /// The register layout of the DVI LV12.
    pub fn dvi_lv12() -> Self {
        Self {
            // Bit 13 intentionally absent.
            coils: vec![
                coil(0, "Soft starter Compressor", Some("power")),
                coil(1, "3-vay shunt VV open/close", None),
                coil(2, "Start/stop expansion valve", None),
                coil(3, "Heating element", Some("power")),
                coil(4, "Circ. pump warm side", Some("power")),
                coil(5, "El-tracing CV/drain", None),
                coil(8, "4-vay valve defrost", None),
                coil(9, "liquid injection solenoid valve", None),
                coil(10, "3-way shunt CV open", None),
                coil(11, "3-way shunt CV close", None),
                coil(12, "Circ. pumpe CV", Some("power")),
                coil(14, "Sum alarm failure", Some("problem")),
            ],
            inputs: vec![
                temperature(0x01, "CV Forward"),
                temperature(0x02, "CV Return"),
                temperature(0x03, "Storage tank VV"),
                temperature(0x05, "Storage tank CV"),
                temperature(0x06, "Evaporator"),
                temperature(0x07, "Outdoor"),
                temperature(0x0B, "Compressor HP"),
                temperature(0x0C, "Compressor LP"),
            ],
            input_window: 0x01..=0x0E,
            power: InputDef {
                address: 0x24,
                label: "em23_power",
                scale: 0.0001,
                decimals: 4,
                unit: Some("kW"),
                device_class: Some("power"),
            },
            energy: AccumulatorDef {
                high: 0x25,
                low: 0x26,
                label: "em23_energy",
                scale: 0.1,
                decimals: 1,
            },
            echoes: vec![
                echo(0x01, "cv_mode", None),
                echo(0x02, "cv_curve", None),
                echo(0x03, "cv_setpoint", None),
                echo(0x04, "cv_night_setback", None),
                echo(0x0A, "vv_mode", None),
                echo(0x0B, "vv_setpoint", None),
                echo(0x0C, "vv_schedule", None),
                echo(0x0F, "aux_heating", None),
                echo(0xA1, "comp_hours", None),
                echo(0xA2, "vv_hours", None),
                echo(0xA3, "heating_hours", None),
                echo(
                    0xD0,
                    "curve_temp",
                    Some(Adjust {
                        multiplier: 0.1,
                        decimals: 1,
                    }),
                ),
            ],
            commands: vec![
                command("dvi/command/vvstate", 0x10A),
                command("dvi/command/cvstate", 0x101),
                command("dvi/command/cvcurve", 0x102),
                command("dvi/command/vvsetpoint", 0x10B),
                command("dvi/command/tvstate", 0x10F),
            ],
        }
    }

    pub fn coils(&self) -> &[CoilDef] {
        &self.coils
    }

    pub fn inputs(&self) -> &[InputDef] {
        &self.inputs
    }

    /// The FC04 window that is physically polled every fast cycle. Addresses
    /// inside the window without an [`InputDef`] are read but not published.
    pub fn input_window(&self) -> RangeInclusive<u16> {
        self.input_window.clone()
    }

    /// Look up the published input register at `address`, if any.
    pub fn input(&self, address: u16) -> Option<&InputDef> {
        self.inputs.iter().find(|def| def.address == address)
    }

    pub fn power(&self) -> &InputDef {
        &self.power
    }

    pub fn energy(&self) -> &AccumulatorDef {
        &self.energy
    }

    pub fn echoes(&self) -> &[EchoDef] {
        &self.echoes
    }

    pub fn commands(&self) -> &[CommandDef] {
        &self.commands
    }

    /// Look up the command behind `topic`, if any.
    pub fn command(&self, topic: &str) -> Option<&CommandDef> {
        self.commands.iter().find(|def| def.topic == topic)
    }

    /// All subscribed command topics.
    pub fn command_topics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.iter().map(|def| def.topic)
    }
}

fn coil(bit: u8, label: &'static str, device_class: Option<&'static str>) -> CoilDef {
    CoilDef {
        bit,
        label,
        device_class,
    }
}

fn temperature(address: u16, label: &'static str) -> InputDef {
    InputDef {
        address,
        label,
        scale: 0.1,
        decimals: 1,
        unit: Some("°C"),
        device_class: Some("temperature"),
    }
}

fn echo(address: u16, label: &'static str, adjust: Option<Adjust>) -> EchoDef {
    EchoDef {
        address,
        label,
        adjust,
    }
}

fn command(topic: &'static str, address: u16) -> CommandDef {
    CommandDef {
        topic,
        address,
        scale: 1,
    }
}
