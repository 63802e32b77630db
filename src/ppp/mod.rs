mod ipv4cp;
mod lcp;
mod options;
mod pap;

use core::convert::TryInto;

use self::ipv4cp::Ipv4cp;
use self::lcp::{AuthType, Lcp};
use self::pap::Pap;
use crate::time::Instant;
use crate::wire::{Packet, ProtocolType};
use crate::InvalidStateError;

pub use self::ipv4cp::Ipv4Status;

/// Link identity supplied by the user: the credentials offered to the peer
/// if it requires PAP authentication.
pub struct Config<'a> {
    pub username: &'a [u8],
    pub password: &'a [u8],
}

/// Callbacks the link coordinator invokes at the transitions rfc1661 and the
/// PAP/IPCP state machines define. Every method has a no-op default, so a
/// caller interested only in `up`/`down` is not forced to implement the
/// pre-link chat-script hooks too.
pub trait Handler {
    /// Called when `open()` is issued, before LCP's first Configure-Request
    /// goes out. A real implementation might run a modem dial/chat script
    /// here; this crate only calls the hook; running a script over the UART
    /// is the caller's responsibility (see SPEC_FULL.md's external
    /// collaborators).
    fn connect(&mut self) {}
    /// LCP gave up before reaching `Opened` (retry exhaustion while never
    /// having been up).
    fn connect_fail(&mut self) {}
    /// Companion to `finished`, for callers that want to distinguish "run
    /// teardown script" from "update status".
    fn disconnect(&mut self) {}
    /// Raw bytes received while LCP is `Closed`, e.g. for a pre-link chat
    /// exchange. Not driven by this crate; present for interface parity.
    fn recv(&mut self, data: &[u8]) {
        let _ = data;
    }
    /// The network layer is usable: IPCP has been opened following a
    /// successful PAP exchange.
    fn up(&mut self) {}
    /// The network layer has been torn down.
    fn down(&mut self) {}
    /// LCP reached a terminal state (`Closed` or `Stopped`).
    fn finished(&mut self) {}
}

/// A [`Handler`] that does nothing, for callers with no interest in any of
/// the lifecycle callbacks.
pub struct NullHandler;
impl Handler for NullHandler {}

/// Coarse-grained link phase, surfaced for status reporting. The actual
/// sequencing driving these transitions lives in `ppp_link_opened` /
/// `ppp_link_authenticated` / `ppp_link_closed` / `ppp_network_closed` below.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Dead,
    Establish,
    Auth,
    Network,
    Open,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// IPv4 configuration obtained from IPv4CP. None if IPv4CP is not up.
    pub ipv4: Option<Ipv4Status>,
}

/// A deferred `open()`/`close()` request, drained by the next `poll()` —
/// mirroring the reference worker, which only ever mutates state from its
/// single worker task and treats the public entry points as job submission.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum Intent {
    Open,
    Close,
}

pub struct PPP<'a> {
    phase: Phase,
    intent: Option<Intent>,
    pub(crate) lcp: Lcp,
    pap: Pap<'a>,
    ipv4cp: Ipv4cp,
    handler: &'a mut dyn Handler,

    /// IPCP has been opened at least once and not yet torn down.
    network_phase: bool,
    /// Number of network-layer protocols currently open (only ever IPCP, so
    /// this is 0 or 1, but kept as a counter for parity with the reference
    /// this is grounded on, which supports more than one NCP).
    active_network_protocols: u8,
}

impl<'a> PPP<'a> {
    pub fn new(config: Config<'a>, handler: &'a mut dyn Handler) -> Self {
        Self {
            phase: Phase::Dead,
            intent: None,
            lcp: Lcp::new(),
            pap: Pap::new(config.username, config.password),
            ipv4cp: Ipv4cp::new(),
            handler,
            network_phase: false,
            active_network_protocols: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> Status {
        Status {
            ipv4: self.ipv4cp.status(),
        }
    }

    /// Request the link to start connecting. The actual `lcp_open` (and the
    /// first Configure-Request it sends) happens on the next [`poll`](Self::poll)
    /// call, not synchronously — matching the reference, where `open()` only
    /// enqueues a worker job.
    pub fn open(&mut self) -> Result<(), InvalidStateError> {
        if self.phase != Phase::Dead {
            return Err(InvalidStateError);
        }
        self.intent = Some(Intent::Open);
        Ok(())
    }

    /// Request the link to start tearing down. As with `open()`, the actual
    /// `lcp_close` runs on the next `poll()`.
    pub fn close(&mut self) -> Result<(), InvalidStateError> {
        if self.phase == Phase::Dead {
            return Err(InvalidStateError);
        }
        self.intent = Some(Intent::Close);
        Ok(())
    }

    pub fn received(&mut self, pkt: &mut [u8], now: Instant, mut tx: impl FnMut(Packet<'_>)) {
        if pkt.len() < 2 {
            warn!("PPP: frame too short to carry a protocol field");
            return;
        }
        let proto: u16 = u16::from_be_bytes(pkt[0..2].try_into().unwrap());

        match ProtocolType::from(proto) {
            ProtocolType::LCP => {
                let ev = self.lcp.handle(pkt, now, &mut tx);
                self.apply_lcp_events(ev, now, &mut tx);
            }
            ProtocolType::PAP => {
                let ev = self.pap.handle(pkt);
                self.apply_pap_events(ev, now, &mut tx);
            }
            ProtocolType::IPv4CP => {
                let ev = self.ipv4cp.handle(pkt, now, &mut tx);
                self.apply_ipv4cp_events(ev, now, &mut tx);
            }
            ProtocolType::IPv4 => {
                // The caller (PPPoS) intercepts IPv4 frames before they ever
                // reach PPP::received.
                unreachable!("IPv4 frames must be handled by the caller")
            }
            ProtocolType::Unknown => {
                if self.lcp.state() == lcp::State::Opened {
                    tx(self.lcp.send_protocol_reject(pkt));
                } else {
                    debug!("PPP: dropping frame for unrecognized protocol {:#06x}", proto);
                }
            }
        }
    }

    pub fn poll(&mut self, now: Instant, mut tx: impl FnMut(Packet<'_>)) {
        let ev = self.lcp.poll_timers(now, &mut tx);
        self.apply_lcp_events(ev, now, &mut tx);

        let ev = self.pap.poll_timers(now, &mut tx);
        self.apply_pap_events(ev, now, &mut tx);

        let ev = self.ipv4cp.poll_timers(now, &mut tx);
        self.apply_ipv4cp_events(ev, now, &mut tx);

        match self.intent.take() {
            Some(Intent::Open) => {
                self.phase = Phase::Establish;
                self.handler.connect();
                self.lcp.open(now, &mut tx);
            }
            Some(Intent::Close) => {
                let ev = self.lcp.close(now, &mut tx);
                self.apply_lcp_events(ev, now, &mut tx);
            }
            None => {}
        }
    }

    fn apply_lcp_events(&mut self, ev: lcp::Events, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        if ev.opened {
            self.lcp.arm_echo_timer(now);
            self.ppp_link_opened(now, tx);
        }
        if ev.exited_opened {
            self.ppp_link_closed(now, tx);
        }
        if ev.finished {
            self.phase = Phase::Dead;
            self.handler.disconnect();
            self.handler.finished();
        }
    }

    fn apply_pap_events(&mut self, ev: pap::Events, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        if ev.authenticated {
            self.ppp_link_authenticated(now, tx);
        }
        if ev.retries_exhausted && self.lcp.state() == lcp::State::Opened {
            let ev = self.lcp.close(now, tx);
            self.apply_lcp_events(ev, now, tx);
        }
        if ev.code_reject {
            tx(self.lcp.code_reject(ProtocolType::PAP));
        }
    }

    fn apply_ipv4cp_events(&mut self, ev: ipv4cp::Events, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        if ev.opened {
            self.network_phase = true;
            self.active_network_protocols += 1;
        }
        if ev.established {
            self.phase = Phase::Open;
        }
        if ev.closed {
            self.network_phase = false;
            self.ppp_network_closed(now, tx);
        }
        if ev.code_reject {
            tx(self.lcp.code_reject(ProtocolType::IPv4CP));
        }
    }

    /// rfc1661 `ppp_link_opened`: LCP just reached `Opened`.
    fn ppp_link_opened(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        match self.lcp.auth_type() {
            AuthType::None => {
                self.phase = Phase::Network;
                let ev = self.ipv4cp.open(now, tx);
                self.apply_ipv4cp_events(ev, now, tx);
            }
            AuthType::Pap => {
                self.phase = Phase::Auth;
                self.pap.open(now, tx);
            }
        }
    }

    /// `ppp_link_authenticated`: PAP got its Authenticate-Ack.
    fn ppp_link_authenticated(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        self.phase = Phase::Network;
        let ev = self.ipv4cp.open(now, tx);
        self.apply_ipv4cp_events(ev, now, tx);
        self.handler.up();
    }

    /// `ppp_link_closed`: LCP just left `Opened` (either side initiated
    /// termination, or echo failure tore the link down).
    fn ppp_link_closed(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        if self.network_phase {
            let ev = self.ipv4cp.close();
            self.apply_ipv4cp_events(ev, now, tx);
            self.handler.down();
        }
        if self.pap.state() != pap::State::Closed {
            self.pap.close();
        }
    }

    /// `ppp_network_closed`: a network protocol (only ever IPCP here) closed.
    fn ppp_network_closed(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        self.active_network_protocols = self.active_network_protocols.saturating_sub(1);
        if self.active_network_protocols == 0 && self.lcp.state() == lcp::State::Opened {
            let ev = self.lcp.close(now, tx);
            self.apply_lcp_events(ev, now, tx);
        }
    }
}
