use core::convert::TryInto;

use num_enum::{FromPrimitive, IntoPrimitive};

use super::options::{self, Protocol, Verdict};
use crate::time::{Duration, Instant, Timer};
use crate::wire::{Code, PPPPayload, Packet, Payload, ProtocolType};

const CONF_REQ_TIMEOUT: Duration = Duration::from_secs(3);
const CONF_REQ_MAX_RETRIES: u8 = 10;

const TERM_REQ_TIMEOUT: Duration = Duration::from_secs(3);
const TERM_REQ_MAX_RETRIES: u8 = 2;

const STOPPING_TIMEOUT: Duration = Duration::from_secs(2);

const ECHO_INTERVAL: Duration = Duration::from_secs(30);
const ECHO_REPLY_TIMEOUT: Duration = Duration::from_secs(3);
const ECHO_MAX_FAILS: u8 = 5;

const AUTH_PROTO_PAP: u16 = 0xc023;

#[derive(FromPrimitive, IntoPrimitive, Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
enum OptionCode {
    #[num_enum(default)]
    Unknown = 0,
    AuthProto = 3,
}

/// Authentication protocol required by the peer, learned from its
/// Configure-Request.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum AuthType {
    None,
    Pap,
}

/// LCP's ten states (rfc1661 §4.2). `Initial`/`Starting` are part of the full
/// state table but are never entered by this implementation, which only
/// drives LCP from the administrative-`Closed` state onward (the reference
/// this is grounded on does the same — see DESIGN.md).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum State {
    Initial,
    Starting,
    Closed,
    Stopped,
    Closing,
    Stopping,
    ReqSent,
    AckRcvd,
    AckSent,
    Opened,
}

/// Side effects of an LCP transition that the link coordinator must react to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Events {
    /// The link just entered `Opened`: start authentication or IPCP.
    pub opened: bool,
    /// The link just left `Opened`: tear down the network layer.
    pub exited_opened: bool,
    /// LCP reached a terminal state (`Closed`/`Stopped`): teardown is complete.
    pub finished: bool,
}

impl Events {
    fn merge(&mut self, other: Events) {
        self.opened |= other.opened;
        self.exited_opened |= other.exited_opened;
        self.finished |= other.finished;
    }
}

pub(crate) struct Lcp {
    state: State,
    auth: AuthType,

    conf_req_counter: u8,
    conf_req_identifier: u8,
    conf_req_timer: Timer,

    term_req_counter: u8,
    term_req_identifier: u8,
    term_req_timer: Timer,

    stopping_timer: Timer,

    echo_req_identifier: u8,
    echo_reply_identifier: u8,
    echo_fail_counter: u8,
    echo_req_timer: Timer,

    code_reject_identifier: u8,
    proto_reject_identifier: u8,
}

impl Lcp {
    pub fn new() -> Self {
        Self {
            state: State::Closed,
            auth: AuthType::None,
            conf_req_counter: 0,
            conf_req_identifier: 0,
            conf_req_timer: Timer::new(),
            term_req_counter: 0,
            term_req_identifier: 0,
            term_req_timer: Timer::new(),
            stopping_timer: Timer::new(),
            echo_req_identifier: 0,
            echo_reply_identifier: 0xff,
            echo_fail_counter: 0,
            echo_req_timer: Timer::new(),
            code_reject_identifier: 0,
            proto_reject_identifier: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth
    }

    /// Allocate the next identifier for a Code-Reject. Shared by LCP, IPCP
    /// and PAP: Code-Reject is defined once at the LCP layer (rfc1661 §5.8)
    /// and reused verbatim by every protocol that receives an unrecognized
    /// code, so the identifier sequence lives here rather than per-protocol.
    pub fn next_code_reject_id(&mut self) -> u8 {
        self.code_reject_identifier = self.code_reject_identifier.wrapping_add(1);
        self.code_reject_identifier
    }

    pub fn code_reject(&mut self, proto: ProtocolType) -> Packet<'static> {
        let id = self.next_code_reject_id();
        Packet {
            proto,
            payload: Payload::PPP(Code::CodeRej, id, PPPPayload::Raw(&mut [])),
        }
    }

    pub fn send_protocol_reject<'a>(&mut self, pkt: &'a mut [u8]) -> Packet<'a> {
        self.proto_reject_identifier = self.proto_reject_identifier.wrapping_add(1);
        Packet {
            proto: ProtocolType::LCP,
            payload: Payload::PPP(Code::ProtocolRej, self.proto_reject_identifier, PPPPayload::Raw(pkt)),
        }
    }

    pub fn open(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        if self.state != State::Closed {
            warn!("LCP: open() called in invalid state {:?}", self.state);
            return;
        }
        self.set_state(State::ReqSent);
        let mut ev = Events::default();
        self.conf_req_send_first(now, tx, &mut ev);
    }

    pub fn close(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();
        match self.state {
            State::Starting => {
                self.set_state(State::Initial);
                ev.finished = true;
            }
            State::Stopped => self.set_state(State::Closed),
            State::Opened => {
                self.exit_opened();
                ev.exited_opened = true;
                self.conf_req_timer.cancel();
                self.set_state(State::Closing);
                self.term_req_send_first(now, tx, &mut ev);
            }
            State::ReqSent | State::AckSent => {
                self.conf_req_timer.cancel();
                self.set_state(State::Closing);
                self.term_req_send_first(now, tx, &mut ev);
            }
            State::AckRcvd => {
                self.set_state(State::Closing);
                self.term_req_send_first(now, tx, &mut ev);
            }
            State::Stopping => {
                self.set_state(State::Closing);
                self.term_req_send(now, tx, &mut ev);
            }
            State::Initial | State::Closed | State::Closing => {}
        }
        ev
    }

    pub fn poll_timers(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();

        if self.conf_req_timer.poll(now) {
            self.conf_req_send(now, tx, &mut ev);
        }
        if self.term_req_timer.poll(now) {
            self.term_req_send(now, tx, &mut ev);
        }
        if self.stopping_timer.poll(now) {
            self.stopping_timeout(&mut ev);
        }
        if self.echo_req_timer.poll(now) {
            self.echo_req_fire(now, tx, &mut ev);
        }

        ev
    }

    pub fn handle(&mut self, pkt: &mut [u8], now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();

        if pkt.len() < 6 {
            warn!("LCP: packet too short");
            return ev;
        }
        let code = Code::from(pkt[2]);
        let id = pkt[3];
        let len = u16::from_be_bytes(pkt[4..6].try_into().unwrap()) as usize;
        if len + 2 > pkt.len() {
            warn!("LCP: packet length too short");
            return ev;
        }
        let pkt = &mut pkt[..len + 2];

        debug!("LCP: rx {:?} in state {:?}", code, self.state);

        match code {
            Code::ConfigureReq => self.conf_req_recv(id, &pkt[6..], now, tx, &mut ev),
            Code::ConfigureAck => ev.merge(self.conf_ack_recv(id)),
            Code::ConfigureNack | Code::ConfigureRej => {
                self.conf_nack_recv(id, &pkt[6..], code == Code::ConfigureRej, now, tx, &mut ev)
            }
            Code::TerminateReq => self.term_req_recv(id, now, tx, &mut ev),
            Code::TerminateAck => self.term_ack_recv(id, &mut ev),
            Code::EchoReq => {
                if self.state == State::Opened {
                    pkt[2] = Code::EchoReply as u8;
                    tx(Packet {
                        proto: ProtocolType::LCP,
                        payload: Payload::Raw(&mut pkt[2..]),
                    });
                } else {
                    debug!("LCP: ignoring Echo-Request outside Opened");
                }
            }
            Code::EchoReply => {
                if self.state == State::Opened {
                    self.echo_reply_identifier = id;
                    self.echo_fail_counter = 0;
                    self.echo_req_timer.arm(now, ECHO_INTERVAL);
                }
            }
            Code::DiscardReq => {}
            _ if self.state == State::Closed => tx(self.send_term_ack(id)),
            _ => tx(self.code_reject(ProtocolType::LCP)),
        }

        ev
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!("LCP: state {:?} -> {:?}", self.state, state);
        }
        self.state = state;
    }

    fn set_opened(&mut self, ev: &mut Events) {
        self.set_state(State::Opened);
        self.echo_req_identifier = 0;
        self.echo_reply_identifier = 0xff;
        self.echo_fail_counter = 0;
        ev.opened = true;
    }

    /// The echo timer needs `now`; the coordinator arms it right after it
    /// observes `Events::opened` from whichever call produced it.
    pub fn arm_echo_timer(&mut self, now: Instant) {
        self.echo_req_timer.arm(now, ECHO_INTERVAL);
    }

    fn exit_opened(&mut self) {
        self.echo_req_timer.cancel();
    }

    fn send_term_ack(&mut self, id: u8) -> Packet<'static> {
        Packet {
            proto: ProtocolType::LCP,
            payload: Payload::PPP(Code::TerminateAck, id, PPPPayload::Raw(&mut [])),
        }
    }

    fn conf_req_send_first(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        self.conf_req_counter = 0;
        self.conf_req_send(now, tx, ev);
    }

    /// Checked send: bumps the retry counter and gives up once it's
    /// exhausted. Used both for the very first Configure-Request (after
    /// resetting the counter) and every retransmit.
    fn conf_req_send(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        if !matches!(self.state, State::ReqSent | State::AckRcvd | State::AckSent) {
            return;
        }

        self.conf_req_counter += 1;
        if self.conf_req_counter > CONF_REQ_MAX_RETRIES {
            info!("LCP: Configure-Request max retries reached");
            self.conf_req_timer.cancel();
            self.set_state(State::Stopped);
            ev.finished = true;
            return;
        }

        if self.state == State::AckRcvd {
            self.set_state(State::ReqSent);
        }

        self.conf_req_identifier = self.conf_req_identifier.wrapping_add(1);
        self.conf_req_timer.arm(now, CONF_REQ_TIMEOUT);
        tx(options::build_configure_request(
            &mut LcpOptions { auth: self.auth },
            self.conf_req_identifier,
        ));
    }

    fn term_req_send_first(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        self.term_req_counter = 0;
        self.term_req_send(now, tx, ev);
    }

    fn term_req_send(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        if !matches!(self.state, State::Closing | State::Stopping) {
            return;
        }

        self.term_req_counter += 1;
        if self.term_req_counter > TERM_REQ_MAX_RETRIES {
            info!("LCP: Terminate-Request max retries reached");
            self.set_state(if self.state == State::Closing {
                State::Closed
            } else {
                State::Stopped
            });
            ev.finished = true;
            return;
        }

        self.term_req_identifier = self.term_req_identifier.wrapping_add(1);
        self.term_req_timer.arm(now, TERM_REQ_TIMEOUT);
        tx(Packet {
            proto: ProtocolType::LCP,
            payload: Payload::PPP(Code::TerminateReq, self.term_req_identifier, PPPPayload::Raw(&mut [])),
        });
    }

    fn stopping_timeout(&mut self, ev: &mut Events) {
        if !matches!(self.state, State::Closing | State::Stopping) {
            return;
        }
        self.set_state(if self.state == State::Closing {
            State::Closed
        } else {
            State::Stopped
        });
        ev.finished = true;
    }

    fn echo_req_fire(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        if self.state != State::Opened {
            return;
        }

        if self.echo_req_identifier != self.echo_reply_identifier {
            self.echo_fail_counter += 1;
            if self.echo_fail_counter >= ECHO_MAX_FAILS {
                info!("LCP: Echo-Request max failures reached");
                self.exit_opened();
                ev.exited_opened = true;
                self.set_state(State::Stopped);
                ev.finished = true;
                return;
            }
        }

        self.echo_req_identifier = self.echo_req_identifier.wrapping_add(1);
        self.echo_req_timer.arm(now, ECHO_REPLY_TIMEOUT);
        let mut magic = [0u8; 4];
        tx(Packet {
            proto: ProtocolType::LCP,
            payload: Payload::PPP(Code::EchoReq, self.echo_req_identifier, PPPPayload::Raw(&mut magic)),
        });
    }

    fn conf_req_recv(
        &mut self,
        id: u8,
        body: &[u8],
        now: Instant,
        tx: &mut impl FnMut(Packet<'_>),
        ev: &mut Events,
    ) {
        match self.state {
            State::Closed => {
                tx(self.send_term_ack(id));
                return;
            }
            State::Stopped => {
                self.set_state(State::ReqSent);
                // process the request below in the new state
            }
            State::ReqSent | State::AckRcvd | State::AckSent => {}
            State::Opened => {
                self.set_state(State::ReqSent);
                self.exit_opened();
                ev.exited_opened = true;
                self.conf_req_send(now, tx, ev);
            }
            State::Initial | State::Starting | State::Closing | State::Stopping => return,
        }

        let mut opts = LcpOptions { auth: self.auth };
        let resp = match options::received_configure_req(&mut opts, id, body) {
            Some(resp) => resp,
            None => {
                debug!("LCP: dropping malformed Configure-Request");
                return;
            }
        };
        self.auth = opts.auth;
        let acked = matches!(resp.payload, Payload::PPP(Code::ConfigureAck, _, _));
        tx(resp);

        match (acked, self.state) {
            (true, State::ReqSent) => self.set_state(State::AckSent),
            (true, State::AckRcvd) => self.set_opened(ev),
            _ => {}
        }
    }

    fn conf_ack_recv(&mut self, id: u8) -> Events {
        let mut ev = Events::default();
        if id != self.conf_req_identifier {
            return ev;
        }

        match self.state {
            State::ReqSent => {
                self.conf_req_counter = 0;
                self.set_state(State::AckRcvd);
            }
            State::AckSent => {
                self.conf_req_timer.cancel();
                self.set_opened(&mut ev);
            }
            _ => warn!("LCP: unexpected Configure-Ack in state {:?}", self.state),
        }
        ev
    }

    fn conf_nack_recv(
        &mut self,
        id: u8,
        body: &[u8],
        is_rej: bool,
        now: Instant,
        tx: &mut impl FnMut(Packet<'_>),
        ev: &mut Events,
    ) {
        if id != self.conf_req_identifier {
            return;
        }

        let mut opts = LcpOptions { auth: self.auth };
        options::apply_nacked_options(&mut opts, body, is_rej);
        self.auth = opts.auth;

        match self.state {
            // The peer rejected or nak'd our (auth-only) proposal. Treated
            // identically and fatally, matching the reference this is
            // grounded on rather than RFC 1661's distinct Nak handling
            // (see DESIGN.md Open Questions).
            State::ReqSent | State::AckSent => ev.merge(self.close(now, tx)),
            _ => warn!("LCP: unexpected Configure-Nak/Rej in state {:?}", self.state),
        }
    }

    fn term_req_recv(&mut self, id: u8, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        match self.state {
            State::Closed | State::Stopped | State::Closing | State::Stopping | State::ReqSent => {}
            State::AckRcvd | State::AckSent => self.set_state(State::ReqSent),
            State::Opened => {
                self.set_state(State::Stopping);
                self.stopping_timer.arm(now, STOPPING_TIMEOUT);
                self.exit_opened();
                ev.exited_opened = true;
            }
            State::Initial | State::Starting => {}
        }

        tx(self.send_term_ack(id));
    }

    fn term_ack_recv(&mut self, id: u8, ev: &mut Events) {
        if id != self.term_req_identifier {
            return;
        }
        self.term_req_timer.cancel();

        match self.state {
            State::Closing => {
                self.set_state(State::Closed);
                ev.finished = true;
            }
            // Preserved from the reference: a Terminate-Ack received while
            // Stopping finishes this round AND falls through into the same
            // `Stopped` transition as ReqSent/AckRcvd/AckSent. Almost
            // certainly an accident in the original, kept here for parity
            // (see DESIGN.md).
            State::Stopping => {
                ev.finished = true;
                self.set_state(State::Stopped);
            }
            State::ReqSent | State::AckRcvd | State::AckSent => {
                self.set_state(State::Stopped);
            }
            _ => {}
        }
    }
}

struct LcpOptions {
    auth: AuthType,
}

impl Protocol for LcpOptions {
    fn protocol(&self) -> ProtocolType {
        ProtocolType::LCP
    }

    fn peer_options_start(&mut self) {
        self.auth = AuthType::None;
    }

    fn peer_option_received(&mut self, code: u8, data: &[u8]) -> Verdict<'_> {
        let opt = OptionCode::from(code);
        trace!("LCP: rx option {:?} {:?}", opt, data);
        match opt {
            OptionCode::AuthProto => match <[u8; 2]>::try_from(data) {
                Ok(raw) if u16::from_be_bytes(raw) == AUTH_PROTO_PAP => {
                    self.auth = AuthType::Pap;
                    Verdict::Ack
                }
                Ok(_) => Verdict::Nack(&[0xc0, 0x23]),
                // Value too short to even be a protocol number: malformed,
                // not merely "the wrong protocol" — drop the whole packet.
                Err(_) => Verdict::Drop,
            },
            OptionCode::Unknown => Verdict::Rej,
        }
    }

    fn own_options(&mut self, _f: impl FnMut(u8, &[u8])) {
        // The local side never proposes options: it accepts the peer's
        // authentication requirement (or its absence) and otherwise leaves
        // MRU/magic-number/ACFC/PFC at their RFC defaults (see SPEC_FULL.md
        // §9 assumptions).
    }

    fn own_option_nacked(&mut self, _code: u8, _data: &[u8], _is_rej: bool) {
        // We never propose options, so this is never invoked in practice.
    }
}
