//! Defines the Pylon-dialect CAN frame set sent to the inverter.
//!
//! The protocol is a fixed table of 8-byte frames in the `0x42xx` range plus
//! two ensemble information frames in the `0x73xx` range. Each logical frame
//! exists under two numerically adjacent identifiers ("variant A" ending in 0,
//! "variant B" ending in 1); different inverter firmware revisions listen on
//! different variants. Byte order and current bias differ between firmware
//! dialects as well, so all packing decisions are driven by a
//! [`ProtocolConfig`] instead of being hardcoded.

use crate::telemetry::{BmsStatus, NormalizedCellVoltages, TelemetrySnapshot};

#[cfg(feature = "protocol_serde")]
use serde::{Deserialize, Serialize};

/// Identifier of the inverter poll frame. The only inbound identifier this
/// protocol reacts to.
pub const POLL_REQUEST_ID: u16 = 0x4200;

/// Poll payload byte requesting the system data frame group.
pub const POLL_SYSTEM_DATA: u8 = 0x00;
/// Poll payload byte requesting the ensemble information frame group.
pub const POLL_ENSEMBLE_INFO: u8 = 0x02;

/// Bias added to current fields for dialects that expect unsigned wire values.
const CURRENT_BIAS_DA: i32 = 30000;
/// Bias added to the substitute BMS temperature field.
const BMS_TEMPERATURE_BIAS_DC: i16 = 1000;
/// Sentinel written over the charge permission frame while the BMS is faulted.
const PERMISSION_FORBIDDEN: u8 = 0xAA;

pub const FRAME_PAYLOAD_LENGTH: usize = 8;

/// A single outgoing CAN frame: identifier plus 8-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize))]
pub struct CanFrame {
    pub id: u16,
    pub data: [u8; FRAME_PAYLOAD_LENGTH],
}

/// Byte order used for every multi-byte field in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum ByteOrder {
    /// High byte first (the documented Pylon layout).
    HighFirst,
    /// Low byte first, expected by e.g. Sofar firmware.
    #[default]
    LowFirst,
}

/// How signed current quantities are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum CurrentOffset {
    /// Raw two's complement values.
    Signed,
    /// 30000-biased values for inverters that only accept non-negative
    /// currents (e.g. Ferroamp): pack and charge currents gain +30000,
    /// the discharge limit is sent as `30000 - value`.
    #[default]
    Biased30k,
}

/// Which identifier variants are transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum IdVariants {
    /// Identifiers ending in 0 only.
    VariantA,
    /// Identifiers ending in 1 only.
    #[default]
    VariantB,
    /// Both variants, for setups with mixed firmware expectations.
    Both,
}

impl IdVariants {
    fn offsets(self) -> &'static [u16] {
        match self {
            IdVariants::VariantA => &[0],
            IdVariants::VariantB => &[1],
            IdVariants::Both => &[0, 1],
        }
    }
}

/// Dialect selection for one inverter. The defaults match the Ferroamp
/// configuration (variant B identifiers, low byte first, 30k current bias).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub struct ProtocolConfig {
    pub byte_order: ByteOrder,
    pub current_offset: CurrentOffset,
    pub variants: IdVariants,
}

/// Logical frames of the protocol, keyed by their variant A identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "protocol_serde", derive(Serialize, Deserialize))]
pub enum FrameKind {
    /// 0x4210: pack voltage, current, BMS temperature, SOC, SOH.
    BatteryData,
    /// 0x4220: design voltage cutoffs and current limits.
    Limits,
    /// 0x4230: max/min cell voltage (LFP-normalized).
    CellVoltageRange,
    /// 0x4240: max/min cell temperature.
    CellTemperatureRange,
    /// 0x4250: pack status byte.
    PackStatus,
    /// 0x4260: reserved, always zero.
    Reserved4260,
    /// 0x4270: max/min module temperature.
    ModuleTemperatureRange,
    /// 0x4280: charge/discharge permission.
    ChargePermission,
    /// 0x4290: reserved, always zero.
    Reserved4290,
    /// 0x7310: ensemble information, sent on request only.
    EnsembleInfo1,
    /// 0x7320: ensemble information, sent on request only.
    EnsembleInfo2,
}

impl FrameKind {
    pub const COUNT: usize = 11;

    /// The nine frames transmitted in response to a system data poll, in
    /// transmission order.
    pub const SYSTEM_DATA: [FrameKind; 9] = [
        FrameKind::BatteryData,
        FrameKind::Limits,
        FrameKind::CellVoltageRange,
        FrameKind::CellTemperatureRange,
        FrameKind::PackStatus,
        FrameKind::Reserved4260,
        FrameKind::ModuleTemperatureRange,
        FrameKind::ChargePermission,
        FrameKind::Reserved4290,
    ];

    /// The two frames transmitted in response to an ensemble information poll.
    pub const ENSEMBLE_INFO: [FrameKind; 2] = [FrameKind::EnsembleInfo1, FrameKind::EnsembleInfo2];

    /// Variant A identifier; variant B is `base_id() | 1`.
    pub fn base_id(self) -> u16 {
        match self {
            FrameKind::BatteryData => 0x4210,
            FrameKind::Limits => 0x4220,
            FrameKind::CellVoltageRange => 0x4230,
            FrameKind::CellTemperatureRange => 0x4240,
            FrameKind::PackStatus => 0x4250,
            FrameKind::Reserved4260 => 0x4260,
            FrameKind::ModuleTemperatureRange => 0x4270,
            FrameKind::ChargePermission => 0x4280,
            FrameKind::Reserved4290 => 0x4290,
            FrameKind::EnsembleInfo1 => 0x7310,
            FrameKind::EnsembleInfo2 => 0x7320,
        }
    }

    fn index(self) -> usize {
        match self {
            FrameKind::BatteryData => 0,
            FrameKind::Limits => 1,
            FrameKind::CellVoltageRange => 2,
            FrameKind::CellTemperatureRange => 3,
            FrameKind::PackStatus => 4,
            FrameKind::Reserved4260 => 5,
            FrameKind::ModuleTemperatureRange => 6,
            FrameKind::ChargePermission => 7,
            FrameKind::Reserved4290 => 8,
            FrameKind::EnsembleInfo1 => 9,
            FrameKind::EnsembleInfo2 => 10,
        }
    }
}

fn put_u16(data: &mut [u8; FRAME_PAYLOAD_LENGTH], offset: usize, value: u16, order: ByteOrder) {
    let [high, low] = value.to_be_bytes();
    match order {
        ByteOrder::HighFirst => {
            data[offset] = high;
            data[offset + 1] = low;
        }
        ByteOrder::LowFirst => {
            data[offset] = low;
            data[offset + 1] = high;
        }
    }
}

/// The complete set of frame payloads, rebuilt in full on every encode cycle.
///
/// Owned exclusively by the encoder; the dispatcher only reads fully formed
/// frames out of it.
#[derive(Debug)]
pub struct FrameTable {
    config: ProtocolConfig,
    payloads: [[u8; FRAME_PAYLOAD_LENGTH]; FrameKind::COUNT],
}

impl FrameTable {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            payloads: [[0; FRAME_PAYLOAD_LENGTH]; FrameKind::COUNT],
        }
    }

    pub fn config(&self) -> ProtocolConfig {
        self.config
    }

    pub fn payload(&self, kind: FrameKind) -> &[u8; FRAME_PAYLOAD_LENGTH] {
        &self.payloads[kind.index()]
    }

    /// Outgoing frames for the given logical group, expanded over the enabled
    /// identifier variants.
    pub fn frames<'a>(&'a self, kinds: &'a [FrameKind]) -> impl Iterator<Item = CanFrame> + 'a {
        kinds.iter().flat_map(move |kind| {
            self.config.variants.offsets().iter().map(move |offset| CanFrame {
                id: kind.base_id() | offset,
                data: self.payloads[kind.index()],
            })
        })
    }

    fn wire_current(&self, current_da: i16) -> u16 {
        match self.config.current_offset {
            CurrentOffset::Signed => current_da as u16,
            CurrentOffset::Biased30k => (i32::from(current_da) + CURRENT_BIAS_DA) as u16,
        }
    }

    fn wire_discharge_limit(&self, current_da: i16) -> u16 {
        match self.config.current_offset {
            CurrentOffset::Signed => current_da as u16,
            CurrentOffset::Biased30k => (CURRENT_BIAS_DA - i32::from(current_da)) as u16,
        }
    }

    fn status_byte(snapshot: &TelemetrySnapshot) -> u8 {
        // Bits 0..2: 0=sleep, 1=charge, 2=discharge, 3=idle. A faulted BMS
        // reports sleep regardless of current flow.
        if snapshot.bms_status == BmsStatus::Fault {
            0x00
        } else if snapshot.current_da < 0 {
            0x01
        } else if snapshot.current_da > 0 {
            0x02
        } else {
            0x03
        }
    }

    /// Rebuild every payload from the given snapshot.
    ///
    /// Each logical field is written exactly once per cycle; the fault
    /// override of the charge permission frame is applied last so later
    /// writes cannot clobber it within the same cycle.
    pub fn encode(&mut self, snapshot: &TelemetrySnapshot) {
        let cells = NormalizedCellVoltages::from_snapshot(snapshot);
        let order = self.config.byte_order;
        let pack_current = self.wire_current(snapshot.current_da);
        let charge_limit = self.wire_current(snapshot.max_charge_current_da);
        let discharge_limit = self.wire_discharge_limit(snapshot.max_discharge_current_da);

        self.payloads = [[0; FRAME_PAYLOAD_LENGTH]; FrameKind::COUNT];

        let data = &mut self.payloads[FrameKind::BatteryData.index()];
        put_u16(data, 0, snapshot.voltage_dv as u16, order);
        put_u16(data, 2, pack_current, order);
        // No physical BMS temperature sensor exists; the biased max cell
        // temperature is sent in its place.
        put_u16(
            data,
            4,
            snapshot
                .temperature_max_dc
                .wrapping_add(BMS_TEMPERATURE_BIAS_DC) as u16,
            order,
        );
        data[6] = (snapshot.reported_soc_pptt / 100) as u8;
        data[7] = (snapshot.soh_pptt / 100) as u8;

        let data = &mut self.payloads[FrameKind::Limits.index()];
        put_u16(data, 0, snapshot.max_design_voltage_dv, order);
        put_u16(data, 2, snapshot.min_design_voltage_dv, order);
        put_u16(data, 4, charge_limit, order);
        put_u16(data, 6, discharge_limit, order);

        let data = &mut self.payloads[FrameKind::CellVoltageRange.index()];
        put_u16(data, 0, cells.max_mv as u16, order);
        put_u16(data, 2, cells.min_mv as u16, order);

        let data = &mut self.payloads[FrameKind::CellTemperatureRange.index()];
        put_u16(data, 0, snapshot.temperature_max_dc as u16, order);
        put_u16(data, 2, snapshot.temperature_min_dc as u16, order);

        // Module temperatures mirror the cell extremes, both frames carry the
        // same content.
        let data = &mut self.payloads[FrameKind::ModuleTemperatureRange.index()];
        put_u16(data, 0, snapshot.temperature_max_dc as u16, order);
        put_u16(data, 2, snapshot.temperature_min_dc as u16, order);

        self.payloads[FrameKind::PackStatus.index()][0] = Self::status_byte(snapshot);

        // Must stay the last write of the cycle.
        if snapshot.bms_status == BmsStatus::Fault {
            self.payloads[FrameKind::ChargePermission.index()][0..4]
                .fill(PERMISSION_FORBIDDEN);
        }

        log::trace!(
            "encoded frame table: status={:02X} voltage_dV={} current={}",
            self.payloads[FrameKind::PackStatus.index()][0],
            snapshot.voltage_dv,
            snapshot.current_da
        );
    }
}
