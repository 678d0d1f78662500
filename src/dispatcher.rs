//! Request driven dispatcher in front of the CAN transport.
//!
//! The inverter polls the battery with frames on identifier `0x4200`; the
//! first payload byte selects which frame group it wants back. Nothing is
//! sent unsolicited.

use crate::protocol::{
    CanFrame, FrameKind, FrameTable, ProtocolConfig, POLL_ENSEMBLE_INFO, POLL_REQUEST_ID,
    POLL_SYSTEM_DATA,
};
use crate::telemetry::TelemetrySnapshot;
use crate::Error;

/// Send primitive of the underlying CAN bus.
pub trait CanTransport {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), Error>;
}

/// Protocol endpoint for one inverter.
///
/// Owns the frame table and the transport. The host loop is expected to call
/// [`update_values`](Self::update_values) with a fresh telemetry snapshot on
/// its schedule and [`handle_frame`](Self::handle_frame) for every received
/// CAN frame.
#[derive(Debug)]
pub struct PylonInverter<T> {
    transport: T,
    table: FrameTable,
    inverter_alive: bool,
}

impl<T: CanTransport> PylonInverter<T> {
    pub fn new(transport: T, config: ProtocolConfig) -> Self {
        Self {
            transport,
            table: FrameTable::new(config),
            inverter_alive: false,
        }
    }

    /// Re-encode the full frame table from a telemetry snapshot.
    pub fn update_values(&mut self, snapshot: &TelemetrySnapshot) {
        self.table.encode(snapshot);
    }

    /// Read access to the encoded frame table.
    pub fn frame_table(&self) -> &FrameTable {
        &self.table
    }

    /// Handle one received CAN frame.
    ///
    /// Frames on any identifier other than `0x4200` are ignored. A poll frame
    /// always marks the inverter as alive; whether anything is transmitted
    /// depends on its first payload byte.
    pub fn handle_frame(&mut self, id: u16, data: &[u8]) -> Result<(), Error> {
        if id != POLL_REQUEST_ID {
            log::trace!("ignoring frame on identifier {:04X}", id);
            return Ok(());
        }
        self.inverter_alive = true;
        match data.first() {
            Some(&POLL_ENSEMBLE_INFO) => self.send_frames(&FrameKind::ENSEMBLE_INFO),
            Some(&POLL_SYSTEM_DATA) => self.send_frames(&FrameKind::SYSTEM_DATA),
            other => {
                log::warn!("unhandled poll request byte {:02X?}", other);
                Ok(())
            }
        }
    }

    /// Periodic hook of the host loop. The protocol is purely request
    /// driven, so a tick with no pending poll performs no work.
    pub fn tick(&mut self) {}

    /// Whether a poll was received since the last call. Clears the flag.
    pub fn take_inverter_alive(&mut self) -> bool {
        std::mem::take(&mut self.inverter_alive)
    }

    fn send_frames(&mut self, kinds: &[FrameKind]) -> Result<(), Error> {
        for frame in self.table.frames(kinds) {
            log::trace!("transmit {:04X}: {:02X?}", frame.id, frame.data);
            self.transport.transmit(&frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ByteOrder, CurrentOffset, IdVariants};
    use crate::telemetry::{BmsStatus, Chemistry};

    /// Transport that records every transmitted frame.
    #[derive(Debug, Default)]
    struct MockTransport {
        sent: Vec<CanFrame>,
    }

    impl CanTransport for MockTransport {
        fn transmit(&mut self, frame: &CanFrame) -> Result<(), Error> {
            self.sent.push(*frame);
            Ok(())
        }
    }

    fn snapshot() -> TelemetrySnapshot {
        TelemetrySnapshot {
            voltage_dv: 3700,
            current_da: 50,
            cell_max_mv: 3350,
            cell_min_mv: 3290,
            temperature_max_dc: 250,
            temperature_min_dc: 180,
            reported_soc_pptt: 7550,
            soh_pptt: 9900,
            max_design_voltage_dv: 4000,
            min_design_voltage_dv: 3000,
            max_charge_current_da: 500,
            max_discharge_current_da: 600,
            chemistry: Chemistry::Lfp,
            bms_status: BmsStatus::Active,
        }
    }

    fn inverter(variants: IdVariants) -> PylonInverter<MockTransport> {
        let config = ProtocolConfig {
            byte_order: ByteOrder::LowFirst,
            current_offset: CurrentOffset::Biased30k,
            variants,
        };
        let mut inverter = PylonInverter::new(MockTransport::default(), config);
        inverter.update_values(&snapshot());
        inverter
    }

    #[test]
    fn system_data_poll_sends_nine_frames() {
        let mut inverter = inverter(IdVariants::VariantB);
        inverter.handle_frame(0x4200, &[0x00; 8]).unwrap();
        let ids: Vec<_> = inverter.transport.sent.iter().map(|f| f.id).collect();
        assert_eq!(
            ids,
            vec![0x4211, 0x4221, 0x4231, 0x4241, 0x4251, 0x4261, 0x4271, 0x4281, 0x4291]
        );
        assert!(inverter.take_inverter_alive());
    }

    #[test]
    fn system_data_poll_with_both_variants() {
        let mut inverter = inverter(IdVariants::Both);
        inverter.handle_frame(0x4200, &[0x00; 8]).unwrap();
        assert_eq!(inverter.transport.sent.len(), 18);
    }

    #[test]
    fn ensemble_poll_sends_two_frames() {
        let mut inverter = inverter(IdVariants::VariantB);
        inverter
            .handle_frame(0x4200, &[0x02, 0, 0, 0, 0, 0, 0, 0])
            .unwrap();
        let ids: Vec<_> = inverter.transport.sent.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x7311, 0x7321]);
    }

    #[test]
    fn unknown_poll_byte_sends_nothing_but_marks_alive() {
        let mut inverter = inverter(IdVariants::VariantB);
        inverter.handle_frame(0x4200, &[0x07; 8]).unwrap();
        assert!(inverter.transport.sent.is_empty());
        assert!(inverter.take_inverter_alive());
        assert!(!inverter.take_inverter_alive());
    }

    #[test]
    fn other_identifiers_are_ignored() {
        let mut inverter = inverter(IdVariants::VariantB);
        inverter.handle_frame(0x4201, &[0x00; 8]).unwrap();
        inverter.handle_frame(0x0305, &[0x00; 8]).unwrap();
        assert!(inverter.transport.sent.is_empty());
        assert!(!inverter.take_inverter_alive());
    }

    #[test]
    fn tick_performs_no_work() {
        let mut inverter = inverter(IdVariants::Both);
        inverter.tick();
        assert!(inverter.transport.sent.is_empty());
    }

    #[test]
    fn transmitted_frames_match_encoded_payloads() {
        let mut inverter = inverter(IdVariants::VariantA);
        inverter.handle_frame(0x4200, &[0x00; 8]).unwrap();
        let battery = inverter
            .transport
            .sent
            .iter()
            .find(|f| f.id == 0x4210)
            .copied()
            .unwrap();
        assert_eq!(&battery.data, inverter.frame_table().payload(FrameKind::BatteryData));
    }
}
