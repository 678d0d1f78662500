use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use pylonbridge_lib::protocol::{ByteOrder, CurrentOffset, IdVariants, ProtocolConfig};
use pylonbridge_lib::telemetry::{BmsStatus, Chemistry, TelemetrySnapshot};
use std::time::Duration;

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum ByteOrderArg {
    /// High byte first (documented Pylon layout)
    HighFirst,
    /// Low byte first (e.g. Sofar firmware)
    LowFirst,
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum CurrentOffsetArg {
    /// Raw signed current values
    Signed,
    /// 30000-biased current values (e.g. Ferroamp firmware)
    Biased30k,
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum IdVariantsArg {
    /// Identifiers ending in 0
    A,
    /// Identifiers ending in 1
    B,
    /// Both identifier variants
    Both,
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum ChemistryArg {
    Lfp,
    Nmc,
    Nca,
}

/// Telemetry values used to fill the frame table.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct TelemetryArgs {
    /// Pack voltage in deci-volts
    #[arg(long, default_value = "3700")]
    pub voltage_dv: i16,
    /// Pack current in deci-amps (negative=charging, positive=discharging)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub current_da: i16,
    /// Highest cell voltage in millivolts
    #[arg(long, default_value = "3350")]
    pub cell_max_mv: i32,
    /// Lowest cell voltage in millivolts
    #[arg(long, default_value = "3300")]
    pub cell_min_mv: i32,
    /// Highest temperature in deci-degrees Celsius
    #[arg(long, default_value = "250", allow_hyphen_values = true)]
    pub temperature_max_dc: i16,
    /// Lowest temperature in deci-degrees Celsius
    #[arg(long, default_value = "200", allow_hyphen_values = true)]
    pub temperature_min_dc: i16,
    /// State of charge in hundredths of a percent
    #[arg(long, default_value = "5000")]
    pub soc_pptt: u16,
    /// State of health in hundredths of a percent
    #[arg(long, default_value = "10000")]
    pub soh_pptt: u16,
    /// Maximum design voltage in deci-volts
    #[arg(long, default_value = "4000")]
    pub max_design_voltage_dv: u16,
    /// Minimum design voltage in deci-volts
    #[arg(long, default_value = "3000")]
    pub min_design_voltage_dv: u16,
    /// Maximum charge current in deci-amps
    #[arg(long, default_value = "500")]
    pub max_charge_current_da: i16,
    /// Maximum discharge current in deci-amps
    #[arg(long, default_value = "500")]
    pub max_discharge_current_da: i16,
    /// Battery cell chemistry
    #[arg(long, value_enum, default_value_t = ChemistryArg::Lfp)]
    pub chemistry: ChemistryArg,
    /// Report the BMS as faulted
    #[arg(long, action)]
    pub fault: bool,
}

impl TelemetryArgs {
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            voltage_dv: self.voltage_dv,
            current_da: self.current_da,
            cell_max_mv: self.cell_max_mv,
            cell_min_mv: self.cell_min_mv,
            temperature_max_dc: self.temperature_max_dc,
            temperature_min_dc: self.temperature_min_dc,
            reported_soc_pptt: self.soc_pptt,
            soh_pptt: self.soh_pptt,
            max_design_voltage_dv: self.max_design_voltage_dv,
            min_design_voltage_dv: self.min_design_voltage_dv,
            max_charge_current_da: self.max_charge_current_da,
            max_discharge_current_da: self.max_discharge_current_da,
            chemistry: match self.chemistry {
                ChemistryArg::Lfp => Chemistry::Lfp,
                ChemistryArg::Nmc => Chemistry::Nmc,
                ChemistryArg::Nca => Chemistry::Nca,
            },
            bms_status: if self.fault {
                BmsStatus::Fault
            } else {
                BmsStatus::Active
            },
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Encode the given telemetry and print the nine system data frames
    SystemData {
        #[command(flatten)]
        telemetry: TelemetryArgs,
    },
    /// Print the two ensemble information frames
    SetupInfo,
    /// Encode the given telemetry and dump the full frame table
    Frames {
        #[command(flatten)]
        telemetry: TelemetryArgs,
    },
    /// Feed inverter polls through the dispatcher and print what would be
    /// transmitted
    Simulate {
        #[command(flatten)]
        telemetry: TelemetryArgs,
        /// First payload byte of the poll frame (0x00=system data,
        /// 0x02=ensemble information)
        #[arg(long, value_parser = clap_num::maybe_hex::<u8>, default_value = "0x00")]
        poll: u8,
        /// Interval between polls (e.g. "1s", "500ms")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "1s")]
        interval: Duration,
        /// Number of polls to simulate; runs until interrupted if omitted
        #[clap(long, short)]
        count: Option<u32>,
    },
}

const fn about_text() -> &'static str {
    "pylon-dialect CAN inverter protocol command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Byte order for all multi-byte fields
    #[arg(long, value_enum, default_value_t = ByteOrderArg::LowFirst)]
    pub byte_order: ByteOrderArg,

    /// How current values are put on the wire
    #[arg(long, value_enum, default_value_t = CurrentOffsetArg::Biased30k)]
    pub current_offset: CurrentOffsetArg,

    /// Which identifier variants to transmit
    #[arg(long, value_enum, default_value_t = IdVariantsArg::B)]
    pub variants: IdVariantsArg,

    /// Print frames as JSON instead of hex
    #[arg(long, action)]
    pub json: bool,

    #[command(subcommand)]
    pub command: CliCommands,
}

impl CliArgs {
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            byte_order: match self.byte_order {
                ByteOrderArg::HighFirst => ByteOrder::HighFirst,
                ByteOrderArg::LowFirst => ByteOrder::LowFirst,
            },
            current_offset: match self.current_offset {
                CurrentOffsetArg::Signed => CurrentOffset::Signed,
                CurrentOffsetArg::Biased30k => CurrentOffset::Biased30k,
            },
            variants: match self.variants {
                IdVariantsArg::A => IdVariants::VariantA,
                IdVariantsArg::B => IdVariants::VariantB,
                IdVariantsArg::Both => IdVariants::Both,
            },
        }
    }
}
