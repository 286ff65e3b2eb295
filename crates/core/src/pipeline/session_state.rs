use std::fmt;

/// Flags owned by the controller. Each is set only after its operation
/// succeeded. `camera_running` is cleared when the capture stream ends;
/// `transport_connected` is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    pub transport_connected: bool,
    pub camera_running: bool,
}

/// Where the session stands, derived from [`SessionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    TransportConnected,
    /// Link up and camera running; detection is enabled.
    Ready,
}

impl SessionState {
    pub fn pipeline_state(&self) -> PipelineState {
        match (self.transport_connected, self.camera_running) {
            (true, true) => PipelineState::Ready,
            (true, false) => PipelineState::TransportConnected,
            // The camera is only started after a successful link
            (false, _) => PipelineState::Idle,
        }
    }

    pub fn detection_enabled(&self) -> bool {
        self.pipeline_state() == PipelineState::Ready
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TransportConnected => "transport connected",
            Self::Ready => "ready",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, PipelineState::Idle)]
    #[case(true, false, PipelineState::TransportConnected)]
    #[case(true, true, PipelineState::Ready)]
    #[case(false, true, PipelineState::Idle)]
    fn test_pipeline_state_from_flags(
        #[case] transport_connected: bool,
        #[case] camera_running: bool,
        #[case] expected: PipelineState,
    ) {
        let state = SessionState {
            transport_connected,
            camera_running,
        };
        assert_eq!(state.pipeline_state(), expected);
        assert_eq!(state.detection_enabled(), expected == PipelineState::Ready);
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(SessionState::default().pipeline_state(), PipelineState::Idle);
    }

    #[test]
    fn test_display() {
        assert_eq!(PipelineState::TransportConnected.to_string(), "transport connected");
    }
}
