//! Multi-interval polling scheduler.
//!
//! One cooperative loop ticks every second. Each tick checks the three poll
//! groups against their intervals and runs every due group's sequence to
//! completion before the next group is evaluated, so no two groups' bus
//! transactions ever overlap. A group's timer advances only when the group
//! completed successfully; a failed attempt retries on the next tick, which
//! delays rather than skips the cycle. Up to one tick of scheduling jitter
//! on every interval boundary is accepted.

use crate::bus::SerialBus;
use crate::protocol::{self, round_to};
use crate::publisher::MeasurementPublisher;
use crate::schema::{AccumulatorDef, EchoDef, InputDef, RegisterSchema};
use crate::state::DeviceSnapshot;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scheduler tick width.
pub const TICK: Duration = Duration::from_secs(1);

/// The three independently timed polling units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollGroup {
    /// Coil window, every 13 s.
    Coils,
    /// Input registers and power, every 17 s.
    Fast,
    /// Energy accumulator and echo reads, every 60 s.
    Slow,
}

impl PollGroup {
    pub fn interval(self) -> Duration {
        match self {
            PollGroup::Coils => Duration::from_secs(13),
            PollGroup::Fast => Duration::from_secs(17),
            PollGroup::Slow => Duration::from_secs(60),
        }
    }
}

/// Per-group "last completed at" timestamps.
///
/// A group with no timestamp yet is always due. Timestamps advance only via
/// [`PollTimers::complete`].
#[derive(Debug, Default)]
pub struct PollTimers {
    coils: Option<Instant>,
    fast: Option<Instant>,
    slow: Option<Instant>,
}

impl PollTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `group`'s interval has elapsed at `now`.
    pub fn due(&self, group: PollGroup, now: Instant) -> bool {
        match self.slot(group) {
            None => true,
            Some(last) => now.duration_since(last) >= group.interval(),
        }
    }

    /// Record that `group` completed its work successfully at `now`.
    pub fn complete(&mut self, group: PollGroup, now: Instant) {
        *self.slot_mut(group) = Some(now);
    }

    fn slot(&self, group: PollGroup) -> Option<Instant> {
        match group {
            PollGroup::Coils => self.coils,
            PollGroup::Fast => self.fast,
            PollGroup::Slow => self.slow,
        }
    }

    fn slot_mut(&mut self, group: PollGroup) -> &mut Option<Instant> {
        match group {
            PollGroup::Coils => &mut self.coils,
            PollGroup::Fast => &mut self.fast,
            PollGroup::Slow => &mut self.slow,
        }
    }
}

/// Merge a scaled input register value into the snapshot.
pub fn apply_input(snapshot: &mut DeviceSnapshot, def: &InputDef, raw: u16) {
    let value = round_to(f64::from(raw) * def.scale, def.decimals);
    snapshot.input_registers.insert(def.label.to_string(), value);
}

/// Merge the two-word energy accumulator into the snapshot.
pub fn apply_energy(snapshot: &mut DeviceSnapshot, def: &AccumulatorDef, high: u16, low: u16) {
    let raw = (u32::from(high) << 16) | u32::from(low);
    let value = round_to(f64::from(raw) * def.scale, def.decimals);
    snapshot.input_registers.insert(def.label.to_string(), value);
}

/// Merge an echo-read value into the snapshot, applying the per-register
/// adjustment where configured (default: no scaling).
pub fn apply_echo(snapshot: &mut DeviceSnapshot, def: &EchoDef, raw: u16) {
    let value = match def.adjust {
        Some(adjust) => round_to(f64::from(raw) * adjust.multiplier, adjust.decimals),
        None => f64::from(raw),
    };
    snapshot.write_registers.insert(def.label.to_string(), value);
}

/// The bridge engine: schema, cache, timers, and the bus handle, constructed
/// once at startup.
pub struct BridgeEngine {
    schema: Arc<RegisterSchema>,
    bus: Arc<SerialBus>,
    snapshot: DeviceSnapshot,
    timers: PollTimers,
    publisher: MeasurementPublisher,
}

impl BridgeEngine {
    pub fn new(
        schema: Arc<RegisterSchema>,
        bus: Arc<SerialBus>,
        publisher: MeasurementPublisher,
    ) -> Self {
        Self {
            schema,
            bus,
            snapshot: DeviceSnapshot::default(),
            timers: PollTimers::new(),
            publisher,
        }
    }

    /// Run the polling loop forever.
    pub async fn run(&mut self) {
        info!(
            "Polling started (coils {:?}, fast {:?}, slow {:?})",
            PollGroup::Coils.interval(),
            PollGroup::Fast.interval(),
            PollGroup::Slow.interval()
        );

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick(Instant::now()).await;
        }
    }

    /// Run one scheduler tick: poll every due group, then publish on change.
    pub async fn tick(&mut self, now: Instant) {
        if self.timers.due(PollGroup::Coils, now) && self.poll_coils().await > 0 {
            self.timers.complete(PollGroup::Coils, now);
        }

        if self.timers.due(PollGroup::Fast, now) && self.poll_fast().await > 0 {
            self.timers.complete(PollGroup::Fast, now);
        }

        if self.timers.due(PollGroup::Slow, now) && self.poll_slow().await > 0 {
            self.timers.complete(PollGroup::Slow, now);
        }

        if let Err(e) = self.publisher.publish_if_changed(&self.snapshot).await {
            warn!("Snapshot publish failed: {}", e);
        }
    }

    /// Read and decode the coil window. On success the whole coil map is
    /// replaced; on failure the previous map stays untouched.
    async fn poll_coils(&mut self) -> usize {
        match protocol::read_coils(&self.bus).await {
            Ok(mask) => {
                self.snapshot.coils = protocol::decode_coils(&self.schema, mask);
                1
            }
            Err(e) => {
                warn!("Coil read failed: {}", e);
                0
            }
        }
    }

    /// Poll the whole FC04 window plus the power register. Omitted addresses
    /// are still read to keep the transaction pattern uniform, but only
    /// schema-named entries are merged.
    async fn poll_fast(&mut self) -> usize {
        let mut succeeded = 0;

        for address in self.schema.input_window() {
            match protocol::read_input(&self.bus, address).await {
                Ok(raw) => {
                    succeeded += 1;
                    if let Some(def) = self.schema.input(address) {
                        apply_input(&mut self.snapshot, def, raw);
                    }
                }
                Err(e) => {
                    debug!("Input read {:#04x} failed: {}", address, e);
                }
            }
        }

        let power = *self.schema.power();
        match protocol::read_input(&self.bus, power.address).await {
            Ok(raw) => {
                succeeded += 1;
                apply_input(&mut self.snapshot, &power, raw);
            }
            Err(e) => {
                debug!("Power read failed: {}", e);
            }
        }

        succeeded
    }

    /// Poll the energy accumulator and every echo register.
    async fn poll_slow(&mut self) -> usize {
        let mut succeeded = 0;

        let energy = *self.schema.energy();
        let high = protocol::read_input(&self.bus, energy.high).await;
        let low = protocol::read_input(&self.bus, energy.low).await;
        match (high, low) {
            (Ok(high), Ok(low)) => {
                succeeded += 2;
                apply_energy(&mut self.snapshot, &energy, high, low);
            }
            // Both words are required for a coherent 32-bit value.
            (high, low) => {
                if let Err(e) = high {
                    debug!("Energy high word read failed: {}", e);
                }
                if let Err(e) = low {
                    debug!("Energy low word read failed: {}", e);
                }
            }
        }

        for def in self.schema.echoes().to_vec() {
            match protocol::echo_read(&self.bus, def.address).await {
                Ok(raw) => {
                    succeeded += 1;
                    apply_echo(&mut self.snapshot, &def, raw);
                }
                Err(e) => {
                    debug!("Echo read {:#04x} failed: {}", def.address, e);
                }
            }
        }

        succeeded
    }
}
