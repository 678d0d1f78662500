//! Battery telemetry snapshot and the LFP voltage normalizer.
//!
//! The inverter side of the protocol only understands LFP voltage ranges, so
//! cell voltages from other chemistries are remapped into an LFP-compatible
//! envelope before encoding.

#[cfg(feature = "protocol_serde")]
use serde::{Deserialize, Serialize};

/// Battery cell chemistry as reported by the battery integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum Chemistry {
    /// Lithium iron phosphate, the chemistry the wire protocol assumes.
    Lfp,
    /// Nickel manganese cobalt.
    Nmc,
    /// Nickel cobalt aluminium.
    Nca,
}

/// Operational state of the battery management system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum BmsStatus {
    Standby,
    Active,
    Fault,
}

/// Read-only view of the battery state at encode time.
///
/// Units follow the battery CAN convention: deci-volts, deci-amps and
/// deci-degrees Celsius for pack level values, millivolts for cell voltages,
/// hundredths of a percent for SOC and SOH.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub struct TelemetrySnapshot {
    pub voltage_dv: i16,
    /// Pack current, negative=charging, positive=discharging.
    pub current_da: i16,
    pub cell_max_mv: i32,
    pub cell_min_mv: i32,
    pub temperature_max_dc: i16,
    pub temperature_min_dc: i16,
    pub reported_soc_pptt: u16,
    pub soh_pptt: u16,
    pub max_design_voltage_dv: u16,
    pub min_design_voltage_dv: u16,
    pub max_charge_current_da: i16,
    pub max_discharge_current_da: i16,
    pub chemistry: Chemistry,
    pub bms_status: BmsStatus,
}

/// Cell voltage extremes expressed as if the pack were LFP chemistry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedCellVoltages {
    pub max_mv: i32,
    pub min_mv: i32,
}

const LFP_REMAP_LOW_MV: i32 = 2500;
const LFP_REMAP_HIGH_MV: i32 = 3400;
const CELL_RANGE_HIGH_MV: i32 = 4200;

fn remap_to_lfp(voltage_mv: i32) -> i32 {
    LFP_REMAP_LOW_MV
        + ((voltage_mv - LFP_REMAP_LOW_MV) * (LFP_REMAP_HIGH_MV - LFP_REMAP_LOW_MV))
            / (CELL_RANGE_HIGH_MV - LFP_REMAP_LOW_MV)
}

impl NormalizedCellVoltages {
    /// Derive the LFP-equivalent cell voltage extremes from a snapshot.
    ///
    /// LFP packs pass through unchanged. Any other chemistry is remapped
    /// linearly from [2500, 4200] mV to [2500, 3400] mV. Values outside the
    /// source range extrapolate along the same line, they are not clamped.
    pub fn from_snapshot(snapshot: &TelemetrySnapshot) -> Self {
        match snapshot.chemistry {
            Chemistry::Lfp => Self {
                max_mv: snapshot.cell_max_mv,
                min_mv: snapshot.cell_min_mv,
            },
            _ => Self {
                max_mv: remap_to_lfp(snapshot.cell_max_mv),
                min_mv: remap_to_lfp(snapshot.cell_min_mv),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(chemistry: Chemistry, cell_min_mv: i32, cell_max_mv: i32) -> TelemetrySnapshot {
        TelemetrySnapshot {
            voltage_dv: 3700,
            current_da: 0,
            cell_max_mv,
            cell_min_mv,
            temperature_max_dc: 250,
            temperature_min_dc: 180,
            reported_soc_pptt: 5000,
            soh_pptt: 9900,
            max_design_voltage_dv: 4000,
            min_design_voltage_dv: 3000,
            max_charge_current_da: 500,
            max_discharge_current_da: 500,
            chemistry,
            bms_status: BmsStatus::Active,
        }
    }

    #[test]
    fn lfp_passes_through_unchanged() {
        let normalized =
            NormalizedCellVoltages::from_snapshot(&snapshot(Chemistry::Lfp, 3111, 3333));
        assert_eq!(normalized.min_mv, 3111);
        assert_eq!(normalized.max_mv, 3333);
    }

    #[test]
    fn remap_endpoints() {
        let normalized =
            NormalizedCellVoltages::from_snapshot(&snapshot(Chemistry::Nmc, 2500, 4200));
        assert_eq!(normalized.min_mv, 2500);
        assert_eq!(normalized.max_mv, 3400);
    }

    #[test]
    fn remap_is_order_preserving() {
        let normalized =
            NormalizedCellVoltages::from_snapshot(&snapshot(Chemistry::Nca, 3200, 4050));
        assert!(normalized.min_mv <= normalized.max_mv);
        // 2500 + (3200-2500)*900/1700 = 2870 (truncated), 2500 + 1550*900/1700 = 3320
        assert_eq!(normalized.min_mv, 2870);
        assert_eq!(normalized.max_mv, 3320);
    }

    #[test]
    fn out_of_range_extrapolates() {
        let normalized =
            NormalizedCellVoltages::from_snapshot(&snapshot(Chemistry::Nmc, 2400, 4400));
        assert_eq!(normalized.min_mv, 2500 + (-100 * 900) / 1700);
        assert_eq!(normalized.max_mv, 2500 + (1900 * 900) / 1700);
    }

    #[test]
    fn normalizer_is_deterministic() {
        let snap = snapshot(Chemistry::Nmc, 3000, 4000);
        assert_eq!(
            NormalizedCellVoltages::from_snapshot(&snap),
            NormalizedCellVoltages::from_snapshot(&snap)
        );
    }
}
