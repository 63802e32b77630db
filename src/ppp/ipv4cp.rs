//! IP Control Protocol (rfc1332).
//!
//! Simpler than LCP: no Terminate/Stopping dance, just an `opened` flag, one
//! Configure-Request retransmit timer and a single in-flight identifier —
//! sufficient because this implementation only ever drives the initiator
//! side (see DESIGN.md).

use core::convert::TryInto;
use core::net::Ipv4Addr;

use super::options::{self, Protocol, Verdict};
use crate::time::{Duration, Instant, Timer};
use crate::wire::{Code, Packet, ProtocolType};

const CONF_REQ_TIMEOUT: Duration = Duration::from_secs(3);
const CONF_REQ_MAX_RETRIES: u8 = 5;

const OPT_IP_ADDRESS: u8 = 3;

/// Status of the IPv4 configuration negotiated by IPCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ipv4Status {
    /// The address IPCP negotiated for our side of the link.
    pub address: Ipv4Addr,
    /// The peer's address, if it told us one in its own Configure-Request.
    pub peer_address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Events {
    /// `Open()` was accepted: the coordinator should count this protocol as
    /// an active network protocol (rfc1661's `ppp_network_opened`).
    pub opened: bool,
    /// A Configure-Ack installed our negotiated address: it is now usable.
    pub established: bool,
    /// Retries exhausted, or `Close()` was called: the coordinator should
    /// treat this as `ppp_network_closed` (decrementing the active-protocol
    /// count, possibly closing LCP in turn).
    pub closed: bool,
    /// An inbound control code this module doesn't recognize arrived.
    pub code_reject: bool,
}

pub(crate) struct Ipv4cp {
    opened: bool,
    established: bool,

    conf_req_counter: u8,
    conf_req_identifier: u8,
    conf_req_timer: Timer,

    /// Our address. `0.0.0.0` until the peer Naks us with a concrete value.
    local_addr: Ipv4Addr,
    /// The peer's address, learned from *its* Configure-Request.
    peer_addr: Option<Ipv4Addr>,
}

impl Ipv4cp {
    pub fn new() -> Self {
        Self {
            opened: false,
            established: false,
            conf_req_counter: 0,
            conf_req_identifier: 0,
            conf_req_timer: Timer::new(),
            local_addr: Ipv4Addr::UNSPECIFIED,
            peer_addr: None,
        }
    }

    pub fn status(&self) -> Option<Ipv4Status> {
        if self.established {
            Some(Ipv4Status {
                address: self.local_addr,
                peer_address: self.peer_addr,
            })
        } else {
            None
        }
    }

    pub fn open(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();
        if self.opened {
            return ev;
        }
        self.opened = true;
        self.established = false;
        ev.opened = true;

        self.conf_req_counter = 0;
        self.local_addr = Ipv4Addr::UNSPECIFIED;
        self.conf_req_send(now, tx, &mut ev);
        ev
    }

    pub fn close(&mut self) -> Events {
        let mut ev = Events::default();
        if !self.opened {
            return ev;
        }
        self.conf_req_timer.cancel();
        self.opened = false;
        self.established = false;
        ev.closed = true;
        ev
    }

    pub fn poll_timers(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();
        if self.conf_req_timer.poll(now) {
            self.conf_req_send(now, tx, &mut ev);
        }
        ev
    }

    pub fn handle(&mut self, pkt: &mut [u8], now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();
        if pkt.len() < 6 {
            warn!("IPv4CP: packet too short");
            return ev;
        }
        let code = Code::from(pkt[2]);
        let id = pkt[3];
        let len = u16::from_be_bytes(pkt[4..6].try_into().unwrap()) as usize;
        if len + 2 > pkt.len() {
            warn!("IPv4CP: packet length too short");
            return ev;
        }
        let pkt = &pkt[..len + 2];

        debug!("IPv4CP: rx {:?}", code);

        match code {
            Code::ConfigureReq => {
                let mut opts = Ipv4cpOptions { ipcp: self };
                match options::received_configure_req(&mut opts, id, &pkt[6..]) {
                    Some(resp) => tx(resp),
                    None => debug!("IPv4CP: dropping malformed Configure-Request"),
                }
            }
            Code::ConfigureAck => {
                if id == self.conf_req_identifier && self.opened {
                    self.conf_req_timer.cancel();
                    self.established = true;
                    ev.established = true;
                }
            }
            Code::ConfigureNack | Code::ConfigureRej => {
                if id == self.conf_req_identifier && self.opened {
                    self.conf_req_timer.cancel();
                    let mut opts = Ipv4cpOptions { ipcp: &mut *self };
                    options::apply_nacked_options(&mut opts, &pkt[6..], code == Code::ConfigureRej);
                    self.conf_req_send(now, tx, &mut ev);
                }
            }
            _ => ev.code_reject = true,
        }

        ev
    }

    /// Checked send, mirroring the timer-retry path exactly: bumps
    /// `conf_req_counter` and gives up (closing the protocol) past the
    /// retry ceiling. Used both for retransmits and for the fresh request
    /// sent right after adopting a peer-suggested address from a Nak — the
    /// reference this is grounded on funnels both through the same routine.
    fn conf_req_send(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        if !self.opened {
            return;
        }

        self.conf_req_counter += 1;
        if self.conf_req_counter > CONF_REQ_MAX_RETRIES {
            info!("IPv4CP: Configure-Request max retries reached");
            let close_ev = self.close();
            ev.closed |= close_ev.closed;
            return;
        }

        self.conf_req_identifier = self.conf_req_identifier.wrapping_add(1);
        self.conf_req_timer.arm(now, CONF_REQ_TIMEOUT);
        let id = self.conf_req_identifier;
        let mut opts = Ipv4cpOptions { ipcp: self };
        tx(options::build_configure_request(&mut opts, id));
    }
}

struct Ipv4cpOptions<'a> {
    ipcp: &'a mut Ipv4cp,
}

impl<'a> Protocol for Ipv4cpOptions<'a> {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::IPv4CP
    }

    fn peer_options_start(&mut self) {}

    fn peer_option_received(&mut self, code: u8, data: &[u8]) -> Verdict<'_> {
        match code {
            OPT_IP_ADDRESS => match <[u8; 4]>::try_from(data) {
                Ok(raw) => {
                    self.ipcp.peer_addr = Some(Ipv4Addr::from(raw));
                    Verdict::Ack
                }
                // Wrong-length IP-ADDR value is malformed: drop the whole
                // packet rather than reject just this option.
                Err(_) => Verdict::Drop,
            },
            _ => Verdict::Rej,
        }
    }

    fn own_options(&mut self, mut f: impl FnMut(u8, &[u8])) {
        let octets = self.ipcp.local_addr.octets();
        f(OPT_IP_ADDRESS, &octets);
    }

    fn own_option_nacked(&mut self, code: u8, data: &[u8], is_rej: bool) {
        if code != OPT_IP_ADDRESS || is_rej {
            return;
        }
        if let Ok(raw) = <[u8; 4]>::try_from(data) {
            self.ipcp.local_addr = Ipv4Addr::from(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Payload;

    #[test]
    fn open_proposes_zero_address() {
        let mut ipcp = Ipv4cp::new();
        let mut sent = 0;
        let ev = ipcp.open(Instant::from_millis(0), &mut |pkt| {
            sent += 1;
            match pkt.payload {
                Payload::PPP(Code::ConfigureReq, _, _) => {}
                _ => panic!("expected Configure-Request"),
            }
        });
        assert!(ev.opened);
        assert_eq!(sent, 1);
    }

    #[test]
    fn nak_adopts_suggested_address() {
        let mut ipcp = Ipv4cp::new();
        ipcp.open(Instant::from_millis(0), &mut |_| {});

        let nak = [
            0x80, 0x21, Code::ConfigureNack as u8, 1, 0, 10, 3, 6, 10, 0, 0, 2,
        ];
        let mut resent = 0;
        let ev = ipcp.handle(&mut nak.clone(), Instant::from_millis(0), &mut |_| resent += 1);
        assert!(!ev.established);
        assert_eq!(ipcp.local_addr, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(resent, 1);
    }

    #[test]
    fn ack_with_matching_id_establishes() {
        let mut ipcp = Ipv4cp::new();
        ipcp.open(Instant::from_millis(0), &mut |_| {});

        let ack = [0x80, 0x21, Code::ConfigureAck as u8, 1, 0, 4];
        let ev = ipcp.handle(&mut ack.clone(), Instant::from_millis(0), &mut |_| {});
        assert!(ev.established);
        assert!(ipcp.status().is_some());
    }

    #[test]
    fn peer_configure_request_learns_gateway() {
        let mut ipcp = Ipv4cp::new();
        let body = [3u8, 6, 10, 0, 0, 1];
        let mut pkt = heapless::Vec::<u8, 32>::new();
        pkt.extend_from_slice(&[0x80, 0x21, Code::ConfigureReq as u8, 7, 0, 10])
            .unwrap();
        pkt.extend_from_slice(&body).unwrap();
        let ev = ipcp.handle(&mut pkt, Instant::from_millis(0), &mut |p| {
            assert!(matches!(p.payload, Payload::PPP(Code::ConfigureAck, 7, _)));
        });
        assert!(!ev.code_reject);
        assert_eq!(ipcp.peer_addr, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn ack_with_stale_id_is_ignored() {
        let mut ipcp = Ipv4cp::new();
        ipcp.open(Instant::from_millis(0), &mut |_| {});

        let stale_ack = [0x80, 0x21, Code::ConfigureAck as u8, 0xff, 0, 4];
        let ev = ipcp.handle(&mut stale_ack.clone(), Instant::from_millis(0), &mut |_| {});
        assert!(!ev.established);
        assert!(ipcp.status().is_none());
    }

    #[test]
    fn retries_are_bounded() {
        let mut ipcp = Ipv4cp::new();
        let mut now = Instant::from_millis(0);
        ipcp.open(now, &mut |_| {});

        let mut ev = Events::default();
        for _ in 0..CONF_REQ_MAX_RETRIES {
            now = now + CONF_REQ_TIMEOUT;
            let e = ipcp.poll_timers(now, &mut |_| {});
            ev.closed |= e.closed;
        }
        assert!(!ev.closed);

        now = now + CONF_REQ_TIMEOUT;
        let ev = ipcp.poll_timers(now, &mut |_| {});
        assert!(ev.closed);
    }
}
