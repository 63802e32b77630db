//! TLV option negotiation shared by LCP and IPCP.
//!
//! Each protocol implements [`Protocol`] to classify the options it knows
//! about; this module walks the TLV list in a Configure-Request and combines
//! the per-option verdicts into a single Configure-Ack/Nak/Reject reply,
//! reject taking precedence over nak whenever both are present in the same
//! request.

use heapless::Vec;

use crate::wire::{Code, OptionVal, Options, PPPPayload, Packet, Payload, ProtocolType};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Verdict<'a> {
    Ack,
    Nack(&'a [u8]),
    Rej,
    /// The option's value is malformed (right TLV framing, wrong semantic
    /// length/content) — the whole packet is dropped, not just this option.
    Drop,
}

/// Options a protocol proposes and classifies.
pub(crate) trait Protocol {
    fn protocol(&self) -> ProtocolType;

    /// Enumerate the options we want to propose in our own Configure-Request.
    fn own_options(&mut self, f: impl FnMut(u8, &[u8]));
    /// The peer nak'd or rejected one of our proposed options.
    fn own_option_nacked(&mut self, code: u8, data: &[u8], is_rej: bool);

    /// Called once before classifying the options in an inbound Configure-Request.
    fn peer_options_start(&mut self);
    /// Classify one option from an inbound Configure-Request.
    fn peer_option_received(&mut self, code: u8, data: &[u8]) -> Verdict;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct MalformedError;

/// Walk a raw `type, len, value` TLV option list, calling `f(code, value)` for each.
pub(crate) fn parse_options(
    mut pkt: &[u8],
    mut f: impl FnMut(u8, &[u8]),
) -> Result<(), MalformedError> {
    while !pkt.is_empty() {
        if pkt.len() < 2 {
            return Err(MalformedError);
        }

        let code = pkt[0];
        let len = pkt[1] as usize;

        if pkt.len() < len || len < 2 {
            return Err(MalformedError);
        }

        let data = &pkt[2..len];
        f(code, data);
        pkt = &pkt[len..];
    }

    Ok(())
}

/// Build our own Configure-Request, with a freshly allocated identifier.
pub(crate) fn build_configure_request<P: Protocol>(proto: &mut P, id: u8) -> Packet<'static> {
    let mut opts = Vec::new();

    proto.own_options(|code, data| {
        if opts.push(OptionVal::new(code, data)).is_err() {
            panic!("tx ConfigureReq: too many options")
        }
    });

    Packet {
        proto: proto.protocol(),
        payload: Payload::PPP(Code::ConfigureReq, id, PPPPayload::Options(Options(opts))),
    }
}

/// Feed the option list of an inbound Configure-Nak or Configure-Reject to the
/// protocol. A malformed option list is silently dropped, same as a malformed
/// Configure-Request: there's no well-formed response to send for a Nak/Rej
/// anyway, so this just declines to apply anything.
pub(crate) fn apply_nacked_options<P: Protocol>(proto: &mut P, body: &[u8], is_rej: bool) {
    let _ = parse_options(body, |code, data| proto.own_option_nacked(code, data, is_rej));
}

/// Classify every option in an inbound Configure-Request and build the
/// Configure-Ack/Nak/Reject response. Rejected options always win over
/// nak'd ones: if any option in the request is unrecognized, the reply is a
/// Configure-Reject listing exactly those options and nothing else.
///
/// Returns `None` if the option list is malformed (truncated TLV) or if any
/// option's value is malformed enough that the protocol signals
/// [`Verdict::Drop`] — in both cases the whole packet is silently discarded,
/// no response is sent.
pub(crate) fn received_configure_req<P: Protocol>(
    proto: &mut P,
    id: u8,
    body: &[u8],
) -> Option<Packet<'static>> {
    let mut code = Code::ConfigureAck;
    let mut opts = Vec::new();
    let mut drop_packet = false;

    proto.peer_options_start();
    let parsed = parse_options(body, |ocode, odata| {
        if drop_packet {
            return;
        }

        let (ret_code, data) = match proto.peer_option_received(ocode, odata) {
            Verdict::Ack => (Code::ConfigureAck, odata),
            Verdict::Nack(data) => (Code::ConfigureNack, data),
            Verdict::Rej => (Code::ConfigureRej, odata),
            Verdict::Drop => {
                drop_packet = true;
                return;
            }
        };

        if code < ret_code {
            code = ret_code;
            opts.clear();
        }

        if code == ret_code {
            if opts.push(OptionVal::new(ocode, data)).is_err() {
                panic!("rx ConfigureReq: too many options")
            }
        }
    });

    if parsed.is_err() || drop_packet {
        return None;
    }

    Some(Packet {
        proto: proto.protocol(),
        payload: Payload::PPP(code, id, PPPPayload::Options(Options(opts))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fake {
        rejects_unknown: bool,
    }

    impl Protocol for Fake {
        fn protocol(&self) -> ProtocolType {
            ProtocolType::LCP
        }
        fn own_options(&mut self, _f: impl FnMut(u8, &[u8])) {}
        fn own_option_nacked(&mut self, _code: u8, _data: &[u8], _is_rej: bool) {}
        fn peer_options_start(&mut self) {}
        fn peer_option_received(&mut self, code: u8, data: &[u8]) -> Verdict<'_> {
            match code {
                3 if data == [0xc0, 0x23] => Verdict::Ack,
                3 => Verdict::Nack(&[0xc0, 0x23]),
                _ if self.rejects_unknown => Verdict::Rej,
                _ => Verdict::Ack,
            }
        }
    }

    #[test]
    fn reject_takes_precedence_over_nak() {
        let mut proto = Fake {
            rejects_unknown: true,
        };
        // option 99 (unknown -> Rej) and option 3 with wrong value (-> Nack)
        let body = [99u8, 2, 3, 4, 0x00, 0x00];
        let pkt = received_configure_req(&mut proto, 5, &body).expect("well-formed list");
        match pkt.payload {
            Payload::PPP(Code::ConfigureRej, 5, PPPPayload::Options(opts)) => {
                assert_eq!(opts.0.len(), 1);
            }
            _ => panic!("expected a single Configure-Reject"),
        }
    }

    #[test]
    fn all_acceptable_options_are_acked() {
        let mut proto = Fake {
            rejects_unknown: false,
        };
        let body = [3u8, 4, 0xc0, 0x23];
        let pkt = received_configure_req(&mut proto, 1, &body).expect("well-formed list");
        match pkt.payload {
            Payload::PPP(Code::ConfigureAck, 1, PPPPayload::Options(opts)) => {
                assert_eq!(opts.0.len(), 1);
            }
            _ => panic!("expected Configure-Ack"),
        }
    }

    #[test]
    fn malformed_option_list_is_rejected() {
        let mut count = 0;
        let r = parse_options(&[3, 1], |_, _| count += 1);
        assert!(r.is_err());
        assert_eq!(count, 0);
    }

    #[test]
    fn truncated_configure_req_is_dropped_not_panicked() {
        let mut proto = Fake {
            rejects_unknown: false,
        };
        // A truncated TLV (length byte claims more data than is present).
        let body = [3u8, 4, 0xc0];
        assert!(received_configure_req(&mut proto, 1, &body).is_none());
    }

    #[test]
    fn drop_verdict_discards_the_whole_packet() {
        struct DropsOption3;
        impl Protocol for DropsOption3 {
            fn protocol(&self) -> ProtocolType {
                ProtocolType::LCP
            }
            fn own_options(&mut self, _f: impl FnMut(u8, &[u8])) {}
            fn own_option_nacked(&mut self, _code: u8, _data: &[u8], _is_rej: bool) {}
            fn peer_options_start(&mut self) {}
            fn peer_option_received(&mut self, code: u8, _data: &[u8]) -> Verdict<'_> {
                match code {
                    3 => Verdict::Drop,
                    _ => Verdict::Ack,
                }
            }
        }

        let mut proto = DropsOption3;
        let body = [3u8, 4, 0xc0, 0x23];
        assert!(received_configure_req(&mut proto, 1, &body).is_none());
    }
}
