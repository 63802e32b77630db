use heapless::Vec;
use num_enum::{FromPrimitive, IntoPrimitive};

/// Max number of options in a single Configure-Request/Ack/Nak/Reject.
pub const MAX_OPTIONS: usize = 6;
/// Max length of a single option's value.
pub const MAX_OPTION_LEN: usize = 4;

#[derive(FromPrimitive, IntoPrimitive, Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum ProtocolType {
    #[num_enum(default)]
    Unknown = 0,
    /// Link Control Protocol, rfc1661
    LCP = 0xc021,
    /// Password Authentication Protocol, rfc1334
    PAP = 0xc023,
    /// Internet Protocol v4
    IPv4 = 0x0021,
    /// Internet Protocol v4 Control Protocol, rfc1332
    IPv4CP = 0x8021,
}

#[derive(FromPrimitive, IntoPrimitive, Copy, Clone, Eq, PartialEq, Debug, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Code {
    #[num_enum(default)]
    Unknown = 0,
    ConfigureReq = 1,
    ConfigureAck = 2,
    ConfigureNack = 3,
    ConfigureRej = 4,
    TerminateReq = 5,
    TerminateAck = 6,
    CodeRej = 7,
    ProtocolRej = 8,
    EchoReq = 9,
    EchoReply = 10,
    DiscardReq = 11,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet<'a> {
    pub proto: ProtocolType,
    pub payload: Payload<'a>,
}

impl<'a> Packet<'a> {
    pub fn buffer_len(&self) -> usize {
        2 + self.payload.buffer_len()
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        let proto = self.proto as u16;
        buffer[0..2].copy_from_slice(&proto.to_be_bytes());
        self.payload.emit(&mut buffer[2..])
    }
}

/// PAP (rfc1334) has its own small code space, distinct from the RFC 1661
/// `Code` used by LCP/IPCP (and by Code-Reject/Protocol-Reject, which are
/// shared across every protocol).
#[derive(FromPrimitive, IntoPrimitive, Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PapCode {
    #[num_enum(default)]
    Unknown = 0,
    AuthenticateReq = 1,
    AuthenticateAck = 2,
    AuthenticateNak = 3,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Payload<'a> {
    Raw(&'a mut [u8]),
    PPP(Code, u8, PPPPayload<'a>),
    Pap(PapCode, u8, PPPPayload<'a>),
}

impl<'a> Payload<'a> {
    pub fn buffer_len(&self) -> usize {
        match self {
            Self::Raw(data) => data.len(),
            Self::PPP(_code, _id, payload) => 1 + 1 + 2 + payload.buffer_len(),
            Self::Pap(_code, _id, payload) => 1 + 1 + 2 + payload.buffer_len(),
        }
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        match self {
            Self::Raw(data) => buffer.copy_from_slice(data),
            Self::PPP(code, id, payload) => {
                buffer[0] = *code as u8;
                buffer[1] = *id;
                let len = payload.buffer_len() as u16 + 4;
                buffer[2..4].copy_from_slice(&len.to_be_bytes());
                payload.emit(&mut buffer[4..])
            }
            Self::Pap(code, id, payload) => {
                buffer[0] = *code as u8;
                buffer[1] = *id;
                let len = payload.buffer_len() as u16 + 4;
                buffer[2..4].copy_from_slice(&len.to_be_bytes());
                payload.emit(&mut buffer[4..])
            }
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PPPPayload<'a> {
    Raw(&'a mut [u8]),
    /// Authenticate-Request body: `(peer_id, password)`.
    Pap(&'a [u8], &'a [u8]),
    Options(Options),
}

impl<'a> PPPPayload<'a> {
    pub fn buffer_len(&self) -> usize {
        match self {
            Self::Raw(data) => data.len(),
            Self::Pap(peer_id, password) => 1 + peer_id.len() + 1 + password.len(),
            Self::Options(options) => options.buffer_len(),
        }
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        match self {
            Self::Raw(data) => buffer.copy_from_slice(data),
            Self::Pap(peer_id, password) => {
                buffer[0] = peer_id.len() as u8;
                buffer[1..][..peer_id.len()].copy_from_slice(peer_id);
                buffer[1 + peer_id.len()] = password.len() as u8;
                buffer[1 + peer_id.len() + 1..].copy_from_slice(password);
            }
            Self::Options(options) => options.emit(buffer),
        }
    }
}

pub struct Options(pub Vec<OptionVal, MAX_OPTIONS>);

impl Options {
    pub fn buffer_len(&self) -> usize {
        self.0.iter().map(|opt| opt.buffer_len()).sum()
    }

    pub fn emit(&self, mut buffer: &mut [u8]) {
        for o in &self.0 {
            let len = o.buffer_len();
            o.emit(&mut buffer[..len]);
            buffer = &mut buffer[len..];
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Options {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:?}", &self.0[..])
    }
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OptionVal {
    code: u8,
    data: OptionData,
}

impl OptionVal {
    pub fn new(code: u8, data: &[u8]) -> Self {
        Self {
            code,
            data: OptionData(unwrap!(Vec::from_slice(data))),
        }
    }

    pub fn buffer_len(&self) -> usize {
        2 + self.data.0.len()
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[0] = self.code;
        buffer[1] = self.data.0.len() as u8 + 2;
        buffer[2..].copy_from_slice(&self.data.0);
    }
}

#[derive(Debug)]
struct OptionData(Vec<u8, MAX_OPTION_LEN>);

#[cfg(feature = "defmt")]
impl defmt::Format for OptionData {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:?}", &self.0[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_configure_request_with_one_option() {
        let mut opts = Vec::new();
        opts.push(OptionVal::new(3, &[0xc0, 0x23])).unwrap();
        let pkt = Packet {
            proto: ProtocolType::LCP,
            payload: Payload::PPP(Code::ConfigureReq, 7, PPPPayload::Options(Options(opts))),
        };
        let len = pkt.buffer_len();
        assert_eq!(len, 2 + 4 + 4);
        let mut buf = [0u8; 16];
        pkt.emit(&mut buf[..len]);
        assert_eq!(&buf[..len], &[0xc0, 0x21, 1, 7, 0, 10, 3, 4, 0xc0, 0x23]);
    }

    #[test]
    fn emits_pap_authenticate_request() {
        let pkt = Packet {
            proto: ProtocolType::PAP,
            payload: Payload::Pap(PapCode::AuthenticateReq, 1, PPPPayload::Pap(b"bob", b"s3cr3t")),
        };
        let len = pkt.buffer_len();
        let mut buf = [0u8; 32];
        pkt.emit(&mut buf[..len]);
        assert_eq!(buf[0..2], [0xc0, 0x23]);
        assert_eq!(buf[2], 1); // code
        assert_eq!(buf[3], 1); // id
        assert_eq!(&buf[4..6], &(len as u16 - 2).to_be_bytes());
        assert_eq!(buf[6], 3); // peer_id len
        assert_eq!(&buf[7..10], b"bob");
        assert_eq!(buf[10], 6); // password len
        assert_eq!(&buf[11..17], b"s3cr3t");
    }
}
