//! Virtual acquisition device: paired signal + impedance emission loop

use crate::timer::{NominalTimer, MIN_RELIABLE_INTERVAL};
use crate::waveform::WaveformPolicy;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vdaq_core::{
    Clock, DaqResult, GeneratorConfig, PhaseAdvance, PublisherHandle, StreamDescriptor,
    Transport, REFERENCE_LABELS,
};

/// Lifecycle state of the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorState {
    Initializing,
    AwaitingConsumer,
    Emitting,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No consumer on the data stream; nothing was built or pushed
    Idle,
    /// One sample pair went out with this timestamp
    Emitted { timestamp: f64 },
}

/// Origin and phase cursor of a running generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorClock {
    /// Clock reading captured at loop entry
    pub origin: f64,
    /// Nominal time cursor in seconds
    pub phase: f64,
}

/// Counters accumulated over the generator's lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorStats {
    pub ticks: u64,
    pub emitted: u64,
    pub idle_ticks: u64,
    pub phase: f64,
}

/// Emulated headset publishing a data stream and its impedance companion
pub struct SignalGenerator<P: PublisherHandle, C: Clock> {
    config: GeneratorConfig,
    waveform: WaveformPolicy,
    data: P,
    impedance: P,
    clock: C,
    timing: GeneratorClock,
    timer: NominalTimer,
    state: GeneratorState,
    stats: GeneratorStats,
}

impl<P: PublisherHandle, C: Clock> SignalGenerator<P, C> {
    /// Validate the configuration and register both streams on `transport`
    pub fn new<T>(config: GeneratorConfig, transport: &T, clock: C) -> DaqResult<Self>
    where
        T: Transport<Handle = P>,
    {
        config.validate()?;
        let (signal, impedance) = Self::descriptors(&config);

        let data = transport.register(signal, config.chunk_size, config.buffer_duration_s)?;
        let impedance =
            transport.register(impedance, config.chunk_size, config.buffer_duration_s)?;

        Self::from_handles(config, data, impedance, clock)
    }

    /// Build a generator around already registered handles
    pub fn from_handles(config: GeneratorConfig, data: P, impedance: P, clock: C) -> DaqResult<Self> {
        config.validate()?;

        let channel_count = config.channel_count();
        if channel_count > REFERENCE_LABELS.len() {
            warn!(
                channel_count,
                labeled = REFERENCE_LABELS.len(),
                "channels beyond the reference label set carry no metadata"
            );
        }

        let timer = NominalTimer::from_rate(config.sample_rate_hz);
        if !timer.is_reliable() {
            warn!(
                sample_rate_hz = config.sample_rate_hz,
                interval_us = timer.interval().as_micros() as u64,
                min_reliable_us = MIN_RELIABLE_INTERVAL.as_micros() as u64,
                "nominal interval below timer resolution, achieved rate will fall short"
            );
        }

        let mut generator = SignalGenerator {
            waveform: WaveformPolicy::new(config.waveform, config.seed),
            config,
            data,
            impedance,
            timing: GeneratorClock { origin: 0.0, phase: 0.0 },
            clock,
            timer,
            state: GeneratorState::Initializing,
            stats: GeneratorStats::default(),
        };

        generator.timing.origin = generator.clock.now();
        generator.state = GeneratorState::AwaitingConsumer;

        info!(
            stream = %generator.data.descriptor().name,
            waveform = %generator.config.waveform,
            sample_rate_hz = generator.config.sample_rate_hz,
            channels = channel_count,
            "virtual device ready, waiting for consumers"
        );

        Ok(generator)
    }

    /// Signal and impedance descriptors for a configuration
    pub fn descriptors(config: &GeneratorConfig) -> (StreamDescriptor, StreamDescriptor) {
        (
            StreamDescriptor::signal(
                config.sensor_channel_count,
                config.sample_rate_hz,
                &config.source_id,
            ),
            StreamDescriptor::impedance(
                config.sensor_channel_count,
                config.sample_rate_hz,
                &config.impedance_source_id(),
            ),
        )
    }

    /// One emission step.
    ///
    /// Consumer presence is read from the data stream only. When present, the
    /// same sample and timestamp go to both streams; otherwise neither is
    /// touched. A push failure is returned as-is and is fatal: if the data
    /// push succeeds and the impedance push fails, that one data sample has
    /// no impedance pair.
    pub fn tick(&mut self) -> DaqResult<TickOutcome> {
        self.stats.ticks += 1;

        if !self.data.has_consumers() {
            if self.state == GeneratorState::Emitting {
                info!(stream = %self.data.descriptor().name, "consumer detached, pausing emission");
            }
            self.state = GeneratorState::AwaitingConsumer;
            self.stats.idle_ticks += 1;
            if self.config.phase_advance == PhaseAdvance::EveryTick {
                self.advance_phase();
            }
            return Ok(TickOutcome::Idle);
        }

        if self.state != GeneratorState::Emitting {
            info!(stream = %self.data.descriptor().name, "consumer attached, emitting");
            self.state = GeneratorState::Emitting;
        }

        let timestamp = self.clock.now() - self.timing.origin;
        let sample = self
            .waveform
            .evaluate(self.timing.phase, self.config.channel_count());

        self.data.push(&sample, timestamp)?;
        self.impedance.push(&sample, timestamp)?;

        self.stats.emitted += 1;
        self.advance_phase();

        Ok(TickOutcome::Emitted { timestamp })
    }

    fn advance_phase(&mut self) {
        self.timing.phase += self.config.interval_s();
        self.stats.phase = self.timing.phase;
    }

    /// Re-capture the timestamp origin from the clock
    pub fn reset_origin(&mut self) {
        self.timing.origin = self.clock.now();
    }

    /// Run ticks until `shutdown` turns true or its sender is dropped.
    ///
    /// The timestamp origin is captured on entry, so time spent between
    /// construction and `run` does not show up in timestamps. Shutdown is
    /// checked after each tick, so a tick's pushes are never split. The wait
    /// between ticks is interrupted by a shutdown change.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> DaqResult<GeneratorStats> {
        self.reset_origin();
        info!(
            interval_us = self.timer.interval().as_micros() as u64,
            "emission loop started"
        );

        loop {
            self.tick()?;

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = self.timer.wait() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            ticks = self.stats.ticks,
            emitted = self.stats.emitted,
            "emission loop stopped"
        );
        debug!(stats = ?self.stats, "generator summary");

        Ok(self.stats.clone())
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn phase(&self) -> f64 {
        self.timing.phase
    }

    pub fn timing(&self) -> GeneratorClock {
        self.timing
    }

    pub fn stats(&self) -> &GeneratorStats {
        &self.stats
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn data_handle(&self) -> &P {
        &self.data
    }

    pub fn impedance_handle(&self) -> &P {
        &self.impedance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackTransport;
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::{sleep, Duration};
    use vdaq_core::{DaqError, MonotonicClock, Waveform};

    /// Publisher double recording every push
    #[derive(Clone)]
    struct RecordingHandle {
        descriptor: StreamDescriptor,
        consumers: Arc<AtomicBool>,
        pushes: Arc<Mutex<Vec<(Vec<f32>, f64)>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingHandle {
        fn new(descriptor: StreamDescriptor, consumers: Arc<AtomicBool>) -> Self {
            Self {
                descriptor,
                consumers,
                pushes: Arc::new(Mutex::new(Vec::new())),
                fail: Arc::new(AtomicBool::new(false)),
            }
        }

        fn pushes(&self) -> Vec<(Vec<f32>, f64)> {
            self.pushes.lock().unwrap().clone()
        }
    }

    impl PublisherHandle for RecordingHandle {
        fn descriptor(&self) -> &StreamDescriptor {
            &self.descriptor
        }

        fn has_consumers(&self) -> bool {
            self.consumers.load(Ordering::SeqCst)
        }

        fn push(&mut self, sample: &[f32], timestamp: f64) -> DaqResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DaqError::transport(&self.descriptor.name, "link down"));
            }
            self.pushes.lock().unwrap().push((sample.to_vec(), timestamp));
            Ok(())
        }
    }

    /// Clock advanced by hand, in microseconds
    #[derive(Clone, Default)]
    struct ManualClock {
        micros: Arc<AtomicU64>,
    }

    impl ManualClock {
        fn set(&self, secs: f64) {
            self.micros.store((secs * 1e6) as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> f64 {
            self.micros.load(Ordering::SeqCst) as f64 / 1e6
        }
    }

    struct Rig {
        generator: SignalGenerator<RecordingHandle, ManualClock>,
        consumers: Arc<AtomicBool>,
        data: RecordingHandle,
        impedance: RecordingHandle,
        clock: ManualClock,
    }

    fn rig(config: GeneratorConfig) -> Rig {
        let consumers = Arc::new(AtomicBool::new(false));
        let (signal, imp) = SignalGenerator::<RecordingHandle, ManualClock>::descriptors(&config);
        let data = RecordingHandle::new(signal, consumers.clone());
        // Impedance presence is never consulted
        let impedance = RecordingHandle::new(imp, Arc::new(AtomicBool::new(false)));
        let clock = ManualClock::default();
        clock.set(10.0);

        let generator =
            SignalGenerator::from_handles(config, data.clone(), impedance.clone(), clock.clone())
                .unwrap();

        Rig { generator, consumers, data, impedance, clock }
    }

    fn sinusoid_config() -> GeneratorConfig {
        GeneratorConfig::with_waveform(Waveform::Sinusoid, 500.0)
    }

    #[test]
    fn test_starts_awaiting_consumer() {
        let rig = rig(sinusoid_config());
        assert_eq!(rig.generator.state(), GeneratorState::AwaitingConsumer);
        assert_eq!(rig.generator.timing().origin, 10.0);
        assert_eq!(rig.generator.phase(), 0.0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = GeneratorConfig {
            sample_rate_hz: -1.0,
            ..Default::default()
        };
        let transport = LoopbackTransport::new();
        let result = SignalGenerator::new(config, &transport, MonotonicClock::new());
        assert!(matches!(result, Err(DaqError::InvalidConfiguration { .. })));
        assert!(transport.streams().is_empty());
    }

    #[test]
    fn test_no_pushes_without_consumer() {
        let mut rig = rig(sinusoid_config());
        for _ in 0..250 {
            assert_eq!(rig.generator.tick().unwrap(), TickOutcome::Idle);
        }
        assert!(rig.data.pushes().is_empty());
        assert!(rig.impedance.pushes().is_empty());
        assert_eq!(rig.generator.stats().idle_ticks, 250);
        assert_eq!(rig.generator.phase(), 0.0);
    }

    #[test]
    fn test_pushes_identical_pair() {
        let mut rig = rig(GeneratorConfig {
            waveform: Waveform::Random,
            ..Default::default()
        });
        rig.consumers.store(true, Ordering::SeqCst);

        for i in 0..20 {
            rig.clock.set(10.0 + i as f64 * 0.0021);
            rig.generator.tick().unwrap();
        }

        let data = rig.data.pushes();
        let impedance = rig.impedance.pushes();
        assert_eq!(data.len(), 20);
        assert_eq!(data, impedance);
        assert!(data.iter().all(|(sample, _)| sample.len() == 13));
    }

    #[test]
    fn test_timestamps_use_measured_time() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);

        rig.clock.set(10.5);
        assert_eq!(rig.generator.tick().unwrap(), TickOutcome::Emitted { timestamp: 0.5 });

        // Wall time jumps; phase still moves by one nominal interval
        rig.clock.set(13.0);
        assert_eq!(rig.generator.tick().unwrap(), TickOutcome::Emitted { timestamp: 3.0 });
        assert!((rig.generator.phase() - 2.0 / 500.0).abs() < 1e-12);
    }

    #[test]
    fn test_phase_advances_per_emitted_tick() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        for _ in 0..37 {
            rig.generator.tick().unwrap();
        }
        rig.consumers.store(false, Ordering::SeqCst);
        for _ in 0..11 {
            rig.generator.tick().unwrap();
        }
        assert!((rig.generator.phase() - 37.0 / 500.0).abs() < 1e-9);
        assert_eq!(rig.generator.stats().emitted, 37);
    }

    #[test]
    fn test_state_follows_consumer_presence() {
        let mut rig = rig(sinusoid_config());
        rig.generator.tick().unwrap();
        assert_eq!(rig.generator.state(), GeneratorState::AwaitingConsumer);

        rig.consumers.store(true, Ordering::SeqCst);
        rig.generator.tick().unwrap();
        assert_eq!(rig.generator.state(), GeneratorState::Emitting);

        rig.consumers.store(false, Ordering::SeqCst);
        rig.generator.tick().unwrap();
        assert_eq!(rig.generator.state(), GeneratorState::AwaitingConsumer);
    }

    #[test]
    fn test_late_consumer_sees_sinusoid_at_current_phase() {
        let mut rig = rig(GeneratorConfig {
            phase_advance: PhaseAdvance::EveryTick,
            ..sinusoid_config()
        });

        for _ in 0..100 {
            rig.generator.tick().unwrap();
        }
        assert!(rig.data.pushes().is_empty());
        assert!((rig.generator.phase() - 0.2).abs() < 1e-9);

        rig.consumers.store(true, Ordering::SeqCst);
        let phase = rig.generator.phase();
        rig.generator.tick().unwrap();

        let pushes = rig.data.pushes();
        assert_eq!(pushes.len(), 1);
        let expected = (10.0 * 2.0 * PI * phase).sin() as f32;
        assert_eq!(pushes[0].0, vec![expected; 13]);
    }

    #[test]
    fn test_first_push_starts_at_zero_phase_by_default() {
        let mut rig = rig(sinusoid_config());
        for _ in 0..100 {
            rig.generator.tick().unwrap();
        }
        rig.consumers.store(true, Ordering::SeqCst);
        rig.generator.tick().unwrap();
        assert_eq!(rig.data.pushes()[0].0, vec![0.0; 13]);
    }

    #[test]
    fn test_push_failure_is_fatal() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        rig.data.fail.store(true, Ordering::SeqCst);

        let err = rig.generator.tick().unwrap_err();
        assert!(err.is_transport());
        assert!(rig.impedance.pushes().is_empty());
        assert_eq!(rig.generator.stats().emitted, 0);
        assert_eq!(rig.generator.phase(), 0.0);
    }

    #[test]
    fn test_impedance_failure_leaves_data_unpaired() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        rig.impedance.fail.store(true, Ordering::SeqCst);

        let err = rig.generator.tick().unwrap_err();
        assert!(err.is_transport());
        assert_eq!(rig.data.pushes().len(), 1);
        assert!(rig.impedance.pushes().is_empty());
        assert_eq!(rig.generator.stats().emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(rig.generator.run(rx), async {
            sleep(Duration::from_millis(100)).await;
            tx.send(true).unwrap();
        });

        let stats = stats.unwrap();
        assert!(stats.ticks >= 2);
        assert_eq!(stats.emitted, stats.ticks);
        assert_eq!(rig.data.pushes().len() as u64, stats.emitted);
        assert_eq!(rig.data.pushes(), rig.impedance.pushes());
        assert!((stats.phase - stats.emitted as f64 / 500.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_captures_origin_on_entry() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        // Time passes between construction and the loop starting
        rig.clock.set(10.3);
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(rig.generator.run(rx), async {
            sleep(Duration::from_millis(10)).await;
            tx.send(true).unwrap();
        });

        assert!(stats.unwrap().emitted >= 1);
        assert_eq!(rig.generator.timing().origin, 10.3);
        assert_eq!(rig.data.pushes()[0].1, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_shutdown_sender_dropped() {
        let mut rig = rig(sinusoid_config());
        let (tx, rx) = watch::channel(false);

        let (stats, _) = tokio::join!(rig.generator.run(rx), async move {
            sleep(Duration::from_millis(20)).await;
            drop(tx);
        });

        let stats = stats.unwrap();
        assert!(stats.ticks >= 1);
        assert_eq!(stats.emitted, 0);
        assert!(rig.data.pushes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_propagates_transport_error() {
        let mut rig = rig(sinusoid_config());
        rig.consumers.store(true, Ordering::SeqCst);
        rig.impedance.fail.store(true, Ordering::SeqCst);
        let (_tx, rx) = watch::channel(false);

        let err = rig.generator.run(rx).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_loopback_end_to_end() {
        let transport = LoopbackTransport::new();
        let config = GeneratorConfig {
            waveform: Waveform::Sinusoid,
            source_id: "e2e000000".to_string(),
            buffer_duration_s: 1.0,
            ..Default::default()
        };
        let mut generator = SignalGenerator::new(config, &transport, MonotonicClock::new()).unwrap();
        assert_eq!(transport.streams().len(), 2);
        assert_eq!(generator.impedance_handle().descriptor().unique_id, "e2e000001");

        for _ in 0..10 {
            assert_eq!(generator.tick().unwrap(), TickOutcome::Idle);
        }

        let mut data = transport.subscribe("Virtual Cognionics Quick-20").unwrap();
        let mut impedance = transport
            .subscribe("Virtual Cognionics Quick-20 Impedance")
            .unwrap();
        assert_eq!(impedance.descriptor().channels[0].label, "P8-Z");

        for _ in 0..25 {
            generator.tick().unwrap();
        }

        let (data_ts, data_samples) = data.collect(25).await.unwrap();
        let (imp_ts, imp_samples) = impedance.collect(25).await.unwrap();
        assert_eq!(data_ts, imp_ts);
        assert_eq!(data_samples, imp_samples);
        assert!(data_ts.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(data_samples[0], vec![0.0; 13]);
    }
}
