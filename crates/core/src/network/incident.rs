use crate::types::{Incident, IncidentType, NetworkHealthSnapshot};

/// Router loss at or above this means the gateway is gone.
const GATEWAY_LOSS_PCT: f64 = 80.0;
/// Router loss below this counts as a healthy first hop.
const ROUTER_HEALTHY_LOSS_PCT: f64 = 30.0;
/// Internet loss at or above this means the upstream is down.
const INTERNET_DOWN_LOSS_PCT: f64 = 80.0;
/// Internet loss below this counts as a healthy upstream.
const INTERNET_HEALTHY_LOSS_PCT: f64 = 20.0;
/// Loss at or above this (either path) marks the link unstable.
const UNSTABLE_LOSS_PCT: f64 = 2.0;
/// Jitter at or above this (either path) marks the link unstable.
const UNSTABLE_JITTER_MS: f64 = 30.0;

impl IncidentType {
    /// Fixed user-facing text for this incident.
    pub fn incident(self) -> Incident {
        let (title, hint) = match self {
            Self::GatewayUnreachable => (
                "Gateway Unreachable",
                "Router is not responding. Check Wi-Fi signal/router power.",
            ),
            Self::InternetOutage => (
                "Internet Outage",
                "Router is reachable but upstream internet is failing.",
            ),
            Self::DnsFailure => (
                "DNS Failure",
                "Connectivity is up but DNS lookups are failing.",
            ),
            Self::UnstableLink => (
                "Unstable Link",
                "High jitter/packet loss detected. Calls and streaming may stutter.",
            ),
        };
        Incident { kind: self, title, hint }
    }
}

/// Classify a snapshot into at most one incident, highest priority first.
///
/// Pure: no state, safe at any rate.
pub fn detect(snapshot: &NetworkHealthSnapshot) -> Option<Incident> {
    let kind = if gateway_unreachable(snapshot) {
        IncidentType::GatewayUnreachable
    } else if internet_outage(snapshot) {
        IncidentType::InternetOutage
    } else if dns_failure(snapshot) {
        IncidentType::DnsFailure
    } else if unstable_link(snapshot) {
        IncidentType::UnstableLink
    } else {
        return None;
    };
    Some(kind.incident())
}

fn gateway_unreachable(s: &NetworkHealthSnapshot) -> bool {
    if s.router_loss.unwrap_or(0.0) >= GATEWAY_LOSS_PCT {
        return true;
    }
    // radio up, router known, but not a single router sample
    s.router_ping.is_none() && s.router_ip.is_some() && has_radio_connection(s)
}

fn internet_outage(s: &NetworkHealthSnapshot) -> bool {
    let router_healthy =
        s.router_loss.unwrap_or(100.0) < ROUTER_HEALTHY_LOSS_PCT || s.router_ping.is_some();
    let internet_bad =
        s.internet_loss.unwrap_or(0.0) >= INTERNET_DOWN_LOSS_PCT || s.internet_ping.is_none();
    router_healthy && internet_bad
}

fn dns_failure(s: &NetworkHealthSnapshot) -> bool {
    let internet_healthy =
        s.internet_loss.unwrap_or(100.0) < INTERNET_HEALTHY_LOSS_PCT || s.internet_ping.is_some();
    internet_healthy && s.dns_lookup_ms.is_none()
}

fn unstable_link(s: &NetworkHealthSnapshot) -> bool {
    s.worst_loss() >= UNSTABLE_LOSS_PCT || s.worst_jitter() >= UNSTABLE_JITTER_MS
}

fn has_radio_connection(s: &NetworkHealthSnapshot) -> bool {
    s.band.is_some() || s.link_rate_mbps.unwrap_or(0.0) > 0.0 || s.signal_dbm.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Band;

    fn healthy() -> NetworkHealthSnapshot {
        NetworkHealthSnapshot {
            router_ip: Some("192.168.1.1".into()),
            band: Some(Band::Ghz5),
            link_rate_mbps: Some(866.0),
            signal_dbm: Some(-52),
            router_ping: Some(3.0),
            router_jitter: Some(1.0),
            router_loss: Some(0.0),
            internet_ping: Some(14.0),
            internet_jitter: Some(2.0),
            internet_loss: Some(0.0),
            dns_lookup_ms: Some(18.0),
            ..Default::default()
        }
    }

    fn kind(s: &NetworkHealthSnapshot) -> Option<IncidentType> {
        detect(s).map(|i| i.kind)
    }

    #[test]
    fn healthy_network_has_no_incident() {
        assert_eq!(kind(&healthy()), None);
    }

    #[test]
    fn high_router_loss_is_gateway_unreachable() {
        let s = NetworkHealthSnapshot { router_loss: Some(80.0), ..healthy() };
        assert_eq!(kind(&s), Some(IncidentType::GatewayUnreachable));
    }

    #[test]
    fn silent_router_with_radio_is_gateway_unreachable() {
        let s = NetworkHealthSnapshot {
            router_ping: None,
            router_jitter: None,
            router_loss: Some(10.0),
            ..healthy()
        };
        assert_eq!(kind(&s), Some(IncidentType::GatewayUnreachable));
    }

    #[test]
    fn silent_router_without_radio_is_not_gateway() {
        // no band, no link rate, no signal: radio is down, not the router
        let s = NetworkHealthSnapshot {
            band: None,
            link_rate_mbps: Some(0.0),
            signal_dbm: None,
            router_ping: None,
            router_loss: Some(10.0),
            ..healthy()
        };
        assert_ne!(kind(&s), Some(IncidentType::GatewayUnreachable));
    }

    #[test]
    fn gateway_beats_unstable_link() {
        let s = NetworkHealthSnapshot {
            router_loss: Some(90.0),
            router_jitter: Some(120.0),
            ..healthy()
        };
        assert_eq!(kind(&s), Some(IncidentType::GatewayUnreachable));
    }

    #[test]
    fn gateway_beats_internet_outage() {
        let s = NetworkHealthSnapshot {
            router_loss: Some(85.0),
            internet_ping: None,
            internet_loss: Some(100.0),
            ..healthy()
        };
        assert_eq!(kind(&s), Some(IncidentType::GatewayUnreachable));
    }

    #[test]
    fn upstream_failure_is_internet_outage() {
        let s = NetworkHealthSnapshot {
            internet_ping: None,
            internet_jitter: None,
            internet_loss: Some(100.0),
            ..healthy()
        };
        assert_eq!(kind(&s), Some(IncidentType::InternetOutage));
    }

    #[test]
    fn missing_dns_is_dns_failure() {
        let s = NetworkHealthSnapshot { dns_lookup_ms: None, ..healthy() };
        assert_eq!(kind(&s), Some(IncidentType::DnsFailure));
    }

    #[test]
    fn small_loss_or_high_jitter_is_unstable() {
        let lossy = NetworkHealthSnapshot { internet_loss: Some(2.0), ..healthy() };
        assert_eq!(kind(&lossy), Some(IncidentType::UnstableLink));
        let jittery = NetworkHealthSnapshot { router_jitter: Some(30.0), ..healthy() };
        assert_eq!(kind(&jittery), Some(IncidentType::UnstableLink));
    }

    #[test]
    fn titles_are_fixed() {
        let i = IncidentType::DnsFailure.incident();
        assert_eq!(i.title, "DNS Failure");
        assert_eq!(i.hint, "Connectivity is up but DNS lookups are failing.");
    }
}
