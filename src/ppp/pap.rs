//! Password Authentication Protocol (rfc1334).
//!
//! Simpler than LCP: one outstanding request, one retry timer, no option
//! negotiation. A Nak from the peer ends the attempt with no remedial
//! action — matching the reference this is grounded on, which leaves a
//! `TODO: check if we need to take some action as peer` at that point
//! instead of retrying with different credentials.

use core::convert::TryInto;

use crate::time::{Duration, Instant, Timer};
use crate::wire::{PPPPayload, Packet, Payload, PapCode, ProtocolType};

const AUTH_REQ_TIMEOUT: Duration = Duration::from_secs(3);
const AUTH_REQ_MAX_RETRIES: u8 = 5;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum State {
    Closed,
    AuthReqSent,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct Events {
    /// Peer acked our credentials: LCP/the coordinator should move on to
    /// the network phase.
    pub authenticated: bool,
    /// The peer nak'd our credentials. Purely informational: the reference
    /// this is grounded on takes no remedial action beyond what `handle`
    /// already did (stop retransmitting) — no automatic `lcp_close` (see
    /// DESIGN.md Open Questions).
    pub give_up: bool,
    /// Retries exhausted without a reply. Unlike a Nak, this *does* make the
    /// coordinator close LCP, if it's still Opened.
    pub retries_exhausted: bool,
    /// An inbound code other than Ack/Nak arrived: the coordinator should
    /// send a Code-Reject on LCP's behalf.
    pub code_reject: bool,
}

pub(crate) struct Pap<'c> {
    state: State,
    peer_id: &'c [u8],
    password: &'c [u8],
    req_counter: u8,
    req_identifier: u8,
    req_timer: Timer,
}

impl<'c> Pap<'c> {
    pub fn new(peer_id: &'c [u8], password: &'c [u8]) -> Self {
        Self {
            state: State::Closed,
            peer_id,
            password,
            req_counter: 0,
            req_identifier: 0,
            req_timer: Timer::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn open(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        self.state = State::AuthReqSent;
        self.req_counter = 0;
        self.auth_req_send(now, tx);
    }

    pub fn close(&mut self) {
        self.req_timer.cancel();
        self.state = State::Closed;
    }

    pub fn poll_timers(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) -> Events {
        let mut ev = Events::default();
        if self.req_timer.poll(now) {
            self.auth_req_resend(now, tx, &mut ev);
        }
        ev
    }

    pub fn handle(&mut self, pkt: &[u8]) -> Events {
        let mut ev = Events::default();
        if pkt.len() < 6 {
            warn!("PAP: packet too short");
            return ev;
        }
        let code = PapCode::from(pkt[2]);
        let id = pkt[3];
        let len = u16::from_be_bytes(pkt[4..6].try_into().unwrap()) as usize;
        if len + 2 > pkt.len() {
            warn!("PAP: packet length too short");
            return ev;
        }

        debug!("PAP: rx {:?} in state {:?}", code, self.state);

        match (code, self.state) {
            (PapCode::AuthenticateAck, State::AuthReqSent) if id == self.req_identifier => {
                self.req_timer.cancel();
                self.state = State::Authenticated;
                ev.authenticated = true;
            }
            (PapCode::AuthenticateNak, State::AuthReqSent) if id == self.req_identifier => {
                self.req_timer.cancel();
                self.state = State::Closed;
                ev.give_up = true;
            }
            (PapCode::AuthenticateAck | PapCode::AuthenticateNak, _) => {
                debug!("PAP: ignoring {:?} in state {:?}", code, self.state)
            }
            _ => {
                debug!("PAP: rejecting unrecognized code {:?}", code);
                ev.code_reject = true;
            }
        }

        ev
    }

    fn auth_req_send(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>)) {
        self.req_identifier = self.req_identifier.wrapping_add(1);
        self.req_timer.arm(now, AUTH_REQ_TIMEOUT);
        tx(Packet {
            proto: ProtocolType::PAP,
            payload: Payload::Pap(
                PapCode::AuthenticateReq,
                self.req_identifier,
                PPPPayload::Pap(self.peer_id, self.password),
            ),
        });
    }

    fn auth_req_resend(&mut self, now: Instant, tx: &mut impl FnMut(Packet<'_>), ev: &mut Events) {
        self.req_counter += 1;
        if self.req_counter > AUTH_REQ_MAX_RETRIES {
            info!("PAP: Authenticate-Request max retries reached");
            self.state = State::Closed;
            ev.retries_exhausted = true;
            return;
        }
        self.auth_req_send(now, tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_with_matching_id_authenticates() {
        let mut pap = Pap::new(b"bob", b"secret");
        let mut sent = 0;
        pap.open(Instant::from_millis(0), &mut |_| sent += 1);
        assert_eq!(sent, 1);
        assert_eq!(pap.state(), State::AuthReqSent);

        let ack = [0xc0, 0x23, PapCode::AuthenticateAck as u8, 1, 0, 5, 0];
        let ev = pap.handle(&ack);
        assert!(ev.authenticated);
        assert_eq!(pap.state(), State::Authenticated);
    }

    #[test]
    fn nak_gives_up_without_retry() {
        let mut pap = Pap::new(b"bob", b"secret");
        pap.open(Instant::from_millis(0), &mut |_| {});

        let nak = [0xc0, 0x23, PapCode::AuthenticateNak as u8, 1, 0, 5, 0];
        let ev = pap.handle(&nak);
        assert!(ev.give_up);
        assert_eq!(pap.state(), State::Closed);
    }

    #[test]
    fn retries_are_bounded() {
        let mut pap = Pap::new(b"bob", b"secret");
        let mut now = Instant::from_millis(0);
        pap.open(now, &mut |_| {});

        let mut ev = Events::default();
        for _ in 0..AUTH_REQ_MAX_RETRIES {
            now = now + AUTH_REQ_TIMEOUT;
            ev.merge_for_test(pap.poll_timers(now, &mut |_| {}));
        }
        assert!(!ev.retries_exhausted);

        now = now + AUTH_REQ_TIMEOUT;
        let ev = pap.poll_timers(now, &mut |_| {});
        assert!(ev.retries_exhausted);
    }

    impl Events {
        fn merge_for_test(&mut self, other: Events) {
            self.authenticated |= other.authenticated;
            self.give_up |= other.give_up;
            self.retries_exhausted |= other.retries_exhausted;
            self.code_reject |= other.code_reject;
        }
    }
}
