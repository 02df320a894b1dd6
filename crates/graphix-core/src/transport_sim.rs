use crate::codec::{format_scientific, Command, FrameCodec, FrameFormat};
use crate::transport::{Transport, TransportError};
use std::collections::VecDeque;
use std::time::Duration;

/// Simulated GRAPHIX controller with a pump-down curve behind it.
#[derive(Debug, Clone)]
pub struct SimulatedGauge {
    codec: FrameCodec,
    pressure_pa: f64,
    base_pressure_pa: f64,
    time_constant_s: f64,
    step_s: f64,
    online: bool,
    requests_seen: u64,
}

impl SimulatedGauge {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            codec: FrameCodec::new(format),
            pressure_pa: 101_325.0,
            base_pressure_pa: 5.0e-4,
            time_constant_s: 30.0,
            step_s: 1.0,
            online: true,
            requests_seen: 0,
        }
    }

    /// Simulated seconds that pass between two requests.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step_s = step.as_secs_f64();
        self
    }

    /// An offline gauge swallows requests, so the caller sees a timeout.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn requests_seen(&self) -> u64 {
        self.requests_seen
    }

    fn step(&mut self, dt_s: f64) {
        // Exponential approach to the base pressure.
        let excess = self.pressure_pa - self.base_pressure_pa;
        self.pressure_pa = self.base_pressure_pa + excess * (-dt_s / self.time_constant_s).exp();
    }

    fn answer(&mut self, request: &[u8]) -> Vec<u8> {
        match self.codec.decode_request(request) {
            Ok(Command::ReadPressure) => {
                self.step(self.step_s);
                self.codec.encode_response(&format_scientific(self.pressure_pa))
            }
            _ => self.codec.encode_nak(),
        }
    }
}

impl Default for SimulatedGauge {
    fn default() -> Self {
        Self::new(FrameFormat::default())
    }
}

impl Transport for SimulatedGauge {
    fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.requests_seen += 1;
        if !self.online {
            return Err(TransportError::Timeout(timeout));
        }
        Ok(self.answer(request))
    }

    fn describe(&self) -> String {
        "simulated gauge".to_string()
    }
}

/// Replays canned outcomes in order and records every request written.
/// Once the script runs out every exchange times out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: VecDeque<Result<Vec<u8>, TransportError>>,
    writes: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<Vec<u8>, TransportError>>) -> Self {
        Self {
            script: script.into(),
            writes: Vec::new(),
        }
    }

    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.writes.push(request.to_vec());
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Timeout(timeout)))
    }

    fn describe(&self) -> String {
        "scripted transport".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_gauge_pumps_down() {
        let codec = FrameCodec::default();
        let request = codec.encode_request(&Command::ReadPressure).unwrap();
        let mut gauge = SimulatedGauge::default().with_step(Duration::from_secs(10));

        let first = gauge.exchange(&request, Duration::from_secs(1)).unwrap();
        let second = gauge.exchange(&request, Duration::from_secs(1)).unwrap();
        let first = codec.decode_response(&first, 0).unwrap().value_pa();
        let second = codec.decode_response(&second, 0).unwrap().value_pa();

        assert!(first < 101_325.0);
        assert!(second < first);
        assert!(second > 0.0);
    }

    #[test]
    fn simulated_gauge_naks_unknown_parameters() {
        let codec = FrameCodec::default();
        let request = codec
            .encode_request(&Command::ReadParameter {
                group: 9,
                parameter: 9,
            })
            .unwrap();
        let mut gauge = SimulatedGauge::default();
        let response = gauge.exchange(&request, Duration::from_secs(1)).unwrap();
        assert_eq!(response, codec.encode_nak());
    }

    #[test]
    fn offline_gauge_times_out() {
        let mut gauge = SimulatedGauge::default();
        gauge.set_online(false);
        let res = gauge.exchange(&[0x0F], Duration::from_millis(5));
        assert!(matches!(res, Err(TransportError::Timeout(_))));
        assert_eq!(gauge.requests_seen(), 1);
    }

    #[test]
    fn scripted_transport_runs_dry_into_timeouts() {
        let mut link = ScriptedTransport::new(vec![Ok(vec![1, 2, 3])]);
        assert_eq!(link.exchange(b"a", Duration::from_millis(1)).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            link.exchange(b"b", Duration::from_millis(1)),
            Err(TransportError::Timeout(_))
        ));
        assert_eq!(link.writes(), &[b"a".to_vec(), b"b".to_vec()]);
    }
}
