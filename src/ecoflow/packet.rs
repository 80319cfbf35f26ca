use crate::prelude::*;
use crate::ecoflow::report::{BatteryPack, EmsHeartbeat, EnergyStream};
use crate::ecoflow::wire::Fields;
use crate::ecoflow::xor;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::borrow::Cow;
use std::convert::TryFrom;

mod envelope_fields {
    pub const HEADERS: u64 = 1;
}

mod header_fields {
    pub const PDATA: u64 = 1;
    pub const ENC_TYPE: u64 = 6;
    pub const CMD_FUNC: u64 = 8;
    pub const CMD_ID: u64 = 9;
    pub const SEQ: u64 = 14;
}

pub const CMD_FUNC_EMS: i64 = 96;
pub const ENC_TYPE_XOR: i64 = 1;

// {{{ EmsCommand
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EmsCommand {
    Heartbeat = 1,
    BatteryPackStatus = 7,
    EnergyStream = 33,
}
// }}}

// {{{ MessageKind
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageKind {
    BatteryPackStatus,
    EnergyStream,
    Heartbeat,
    Unknown { cmd_func: i64, cmd_id: i64 },
}

impl MessageKind {
    pub fn from_ids(cmd_func: i64, cmd_id: i64) -> Self {
        if cmd_func != CMD_FUNC_EMS {
            return MessageKind::Unknown { cmd_func, cmd_id };
        }

        match u8::try_from(cmd_id).ok().and_then(|id| EmsCommand::try_from(id).ok()) {
            Some(EmsCommand::BatteryPackStatus) => MessageKind::BatteryPackStatus,
            Some(EmsCommand::EnergyStream) => MessageKind::EnergyStream,
            Some(EmsCommand::Heartbeat) => MessageKind::Heartbeat,
            None => MessageKind::Unknown { cmd_func, cmd_id },
        }
    }
}
// }}}

// {{{ Header
#[derive(Clone, Debug, PartialEq)]
pub struct Header<'a> {
    pub pdata: &'a [u8],
    pub enc_type: i64,
    pub cmd_func: i64,
    pub cmd_id: i64,
    pub seq: i64,
}

impl<'a> Header<'a> {
    pub fn decode(blob: &'a [u8]) -> Result<Self> {
        let h = Fields::decode(blob);

        Ok(Self {
            pdata: h.try_bytes(header_fields::PDATA)?.unwrap_or(&[]),
            enc_type: h.i64_or(header_fields::ENC_TYPE, 0),
            cmd_func: h.i64_or(header_fields::CMD_FUNC, 0),
            cmd_id: h.i64_or(header_fields::CMD_ID, 0),
            seq: h.i64_or(header_fields::SEQ, 0),
        })
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_ids(self.cmd_func, self.cmd_id)
    }

    /// Inner payload with XOR removed when `enc_type` asks for it.
    pub fn payload(&self) -> Cow<'a, [u8]> {
        if self.enc_type == ENC_TYPE_XOR {
            Cow::Owned(xor::decrypt(self.pdata, self.seq))
        } else {
            Cow::Borrowed(self.pdata)
        }
    }
}
// }}}

// {{{ DecodedPayload
/// Everything recognised in one inbound envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedPayload {
    pub battery_packs: Vec<BatteryPack>,
    pub energy_stream: Option<EnergyStream>,
    pub heartbeat: Option<EmsHeartbeat>,
    pub kinds: Vec<MessageKind>,
}

impl DecodedPayload {
    pub fn is_empty(&self) -> bool {
        self.battery_packs.is_empty() && self.energy_stream.is_none() && self.heartbeat.is_none()
    }
}
// }}}

pub struct Parser;
impl Parser {
    /// Decodes one raw envelope. Never fails: a malformed envelope gives an
    /// empty result and a malformed header is skipped.
    pub fn parse(raw: &[u8]) -> DecodedPayload {
        let mut decoded = DecodedPayload::default();

        let headers = match Self::headers(raw) {
            Ok(headers) => headers,
            Err(e) => {
                error!("dropping envelope of {} bytes: {}", raw.len(), e);
                return decoded;
            }
        };

        for blob in headers {
            if let Err(e) = Self::process_header(blob, &mut decoded) {
                debug!("skipping header: {}", e);
            }
        }

        decoded
    }

    fn headers(raw: &[u8]) -> Result<Vec<&[u8]>> {
        let outer = Fields::decode(raw);
        let headers: Vec<&[u8]> = outer
            .get(envelope_fields::HEADERS)
            .iter()
            .filter_map(|v| v.as_bytes())
            .collect();

        if headers.is_empty() && !raw.is_empty() {
            bail!("no header records found");
        }

        Ok(headers)
    }

    fn process_header(blob: &[u8], decoded: &mut DecodedPayload) -> Result<()> {
        let header = Header::decode(blob)?;

        if header.pdata.is_empty() {
            return Ok(());
        }

        let kind = header.kind();
        decoded.kinds.push(kind);
        let pdata = header.payload();

        match kind {
            MessageKind::BatteryPackStatus => {
                decoded.battery_packs.extend(BatteryPack::decode_report(&pdata));
            }
            MessageKind::EnergyStream => match EnergyStream::decode(&pdata) {
                Ok(es) => decoded.energy_stream = Some(es),
                Err(e) => warn!("discarding energy stream report: {}", e),
            },
            MessageKind::Heartbeat => match EmsHeartbeat::decode(&pdata) {
                Ok(hb) => decoded.heartbeat = Some(hb),
                Err(e) => warn!("discarding ems heartbeat: {}", e),
            },
            MessageKind::Unknown { cmd_func, cmd_id } => {
                trace!("ignoring cmd_func={} cmd_id={}", cmd_func, cmd_id);
            }
        }

        Ok(())
    }
}
