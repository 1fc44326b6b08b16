//! Link states and the transitions allowed between them.

use std::fmt;

/// The single authoritative state of the link manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Nothing has been initialized yet. The AP, if configured, is disabled.
    #[default]
    Off,
    /// Something went wrong; scanning resumes after the cooldown period.
    Cooldown,
    /// Station mode, scanning for access points.
    Scanning,
    /// Station (+AP) mode, connecting to the selected candidate.
    Connecting,
    /// Second attempt against the same candidate.
    ///
    /// Some radios fail the first association right after a scan.
    ConnectingRetry,
    /// Station (+AP) mode and associated.
    Connected,
    /// AP-only mode; no station candidates configured.
    ApOnly,
}

impl LinkState {
    /// Whether a scan or association is in flight in this state.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Scanning | Self::Connecting | Self::ConnectingRetry | Self::Connected
        )
    }

    /// Whether the state machine may move from `self` to `to`.
    ///
    /// Any state other than `Off` may be shut down back to `Off`.
    pub fn can_transition_to(self, to: LinkState) -> bool {
        use LinkState::*;

        if to == Off {
            return self != Off;
        }

        matches!(
            (self, to),
            (Off, Scanning)
                | (Off, ApOnly)
                | (Scanning, Connecting)
                | (Scanning, Cooldown)
                | (Connecting, Connected)
                | (Connecting, ConnectingRetry)
                | (ConnectingRetry, Connected)
                | (ConnectingRetry, Cooldown)
                | (Cooldown, Scanning)
                | (Connected, Cooldown)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Cooldown => "cooldown",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::ConnectingRetry => "connecting-retry",
            Self::Connected => "connected",
            Self::ApOnly => "ap-only",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkState::*;

    const ALL: [LinkState; 7] = [
        Off,
        Cooldown,
        Scanning,
        Connecting,
        ConnectingRetry,
        Connected,
        ApOnly,
    ];

    #[test]
    fn test_initial_state_is_off() {
        assert_eq!(LinkState::default(), Off);
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(Off.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Cooldown));
        assert!(Cooldown.can_transition_to(Scanning));
    }

    #[test]
    fn test_retry_edges() {
        assert!(Connecting.can_transition_to(ConnectingRetry));
        assert!(ConnectingRetry.can_transition_to(Connected));
        assert!(ConnectingRetry.can_transition_to(Cooldown));
        // The first failure never goes straight to cooldown
        assert!(!Connecting.can_transition_to(Cooldown));
        assert!(!ConnectingRetry.can_transition_to(ConnectingRetry));
    }

    #[test]
    fn test_ap_only_is_terminal() {
        for to in ALL {
            assert_eq!(ApOnly.can_transition_to(to), to == Off, "ApOnly -> {}", to);
        }
    }

    #[test]
    fn test_off_only_leaves_via_setup() {
        for to in ALL {
            let expected = matches!(to, Scanning | ApOnly);
            assert_eq!(Off.can_transition_to(to), expected, "Off -> {}", to);
        }
    }

    #[test]
    fn test_shutdown_from_everywhere() {
        for from in ALL.into_iter().filter(|s| *s != Off) {
            assert!(from.can_transition_to(Off), "{} -> off", from);
        }
    }

    #[test]
    fn test_no_self_loops() {
        for s in ALL {
            assert!(!s.can_transition_to(s), "{} -> {}", s, s);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectingRetry.to_string(), "connecting-retry");
        assert_eq!(ApOnly.to_string(), "ap-only");
    }
}
