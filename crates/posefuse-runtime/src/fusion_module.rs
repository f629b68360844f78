//! Location fusion tasks.
//!
//! [`start_location_fusion`] wires an odometry channel and a beacon channel
//! into one shared [`ParticleFilter`]:
//!
//! 1. **Beacon task** – feeds every beacon fix to
//!    [`ParticleFilter::measure_helper`].  Stops when the beacon channel
//!    closes or the odometry task has finished.
//! 2. **Odometry task** – feeds every odometry sample to
//!    [`ParticleFilter::measure_master`] and forwards the fused pose on the
//!    output channel.  The output channel closes when the odometry channel
//!    does.
//!
//! When an [`EventBus`] is supplied, fused poses go to
//! [`Topic::FusedPose`], step diagnostics to [`Topic::Diagnostics`] and
//! convergence transitions to [`Topic::SystemAlerts`].
//!
//! [`start_location_fusion_from`] does the wiring from a [`RuntimeConfig`]:
//! it builds the filter from `[filter]`, a bus of `bus_capacity` and an
//! output channel of `output_capacity`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use posefuse_filter::{FilterConfig, ParticleFilter};
//! use posefuse_runtime::fusion_module::start_location_fusion;
//! use posefuse_types::{Point2D, Pose, Stamped};
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> Result<(), posefuse_types::FusionError> {
//! let filter = Arc::new(ParticleFilter::new(FilterConfig::default())?);
//! let (odom_tx, odom_rx) = mpsc::channel(64);
//! let (beacon_tx, beacon_rx) = mpsc::channel::<Stamped<Point2D>>(16);
//! let (fused_tx, mut fused_rx) = mpsc::channel(64);
//!
//! let handle = start_location_fusion(odom_rx, beacon_rx, fused_tx, filter, None);
//! odom_tx.send(Stamped::new(0, Pose::identity())).await.ok();
//! let _fused = fused_rx.recv().await;
//! drop((odom_tx, beacon_tx));
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use posefuse_filter::ParticleFilter;
use posefuse_middleware::{EventBus, Topic};
use posefuse_types::{Event, EventPayload, FusionError, Point2D, Pose, Stamped};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;

const SOURCE: &str = "posefuse-runtime::fusion";

/// Running fusion tasks.
pub struct LocationFusionHandle {
    beacon: JoinHandle<()>,
    odometry: JoinHandle<()>,
    filter: Arc<ParticleFilter>,
}

impl LocationFusionHandle {
    /// The filter the tasks feed.
    pub fn filter(&self) -> &Arc<ParticleFilter> {
        &self.filter
    }

    /// Stop both tasks without waiting for the input channels to close.
    pub fn abort(&self) {
        self.beacon.abort();
        self.odometry.abort();
    }

    /// Wait for both tasks to finish.
    ///
    /// # Errors
    ///
    /// [`FusionError::Channel`] if a task panicked or was aborted.
    pub async fn join(self) -> Result<(), FusionError> {
        let (beacon, odometry) = tokio::join!(self.beacon, self.odometry);
        beacon.map_err(|e| FusionError::Channel(format!("beacon task failed: {e}")))?;
        odometry.map_err(|e| FusionError::Channel(format!("odometry task failed: {e}")))?;
        Ok(())
    }
}

/// Spawn the beacon and odometry tasks on the current tokio runtime.
///
/// With a bus, this installs the filter's step-feedback hook, replacing any
/// hook set before.
pub fn start_location_fusion(
    mut robot_on_odometry: mpsc::Receiver<Stamped<Pose>>,
    mut beacon_on_map: mpsc::Receiver<Stamped<Point2D>>,
    robot_on_map: mpsc::Sender<Stamped<Pose>>,
    filter: Arc<ParticleFilter>,
    bus: Option<EventBus>,
) -> LocationFusionHandle {
    if let Some(bus) = bus.clone() {
        filter.set_step_feedback(move |feedback| {
            let _ = bus.publish_to(
                Topic::Diagnostics,
                Event::new(SOURCE, EventPayload::Step(*feedback)),
            );
        });
    }
    let reporter = Reporter {
        filter: Arc::clone(&filter),
        bus,
        convergent: Arc::new(AtomicBool::new(filter.is_convergent())),
    };

    // Dropped by the odometry task when it finishes.
    let (odometry_alive, mut odometry_closed) = watch::channel(());

    let beacon = {
        let reporter = reporter.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = beacon_on_map.recv() => match item {
                        Some(sample) => {
                            reporter.filter.measure_helper(sample);
                            reporter.convergence();
                        }
                        None => break,
                    },
                    _ = odometry_closed.changed() => break,
                }
            }
            debug!("beacon task finished");
        })
    };

    let odometry = tokio::spawn(async move {
        while let Some(sample) = robot_on_odometry.recv().await {
            let fused = reporter.filter.measure_master(sample);
            reporter.convergence();
            reporter.fused_pose(fused);
            if robot_on_map.send(fused).await.is_err() {
                warn!("fused pose receiver dropped, stopping odometry task");
                break;
            }
        }
        drop(odometry_alive);
        debug!("odometry task finished");
    });

    LocationFusionHandle {
        beacon,
        odometry,
        filter,
    }
}

/// Fusion tasks started by [`start_location_fusion_from`].
pub struct LocationFusionModule {
    pub handle: LocationFusionHandle,
    /// Fused poses, one per odometry sample.
    pub robot_on_map: mpsc::Receiver<Stamped<Pose>>,
    /// Bus the tasks publish on.
    pub bus: EventBus,
}

/// Build the filter, bus and output channel described by `config` and start
/// the fusion tasks.
///
/// # Errors
///
/// [`FusionError::InvalidConfig`] if `config` fails
/// [`RuntimeConfig::validate`].
pub fn start_location_fusion_from(
    config: &RuntimeConfig,
    robot_on_odometry: mpsc::Receiver<Stamped<Pose>>,
    beacon_on_map: mpsc::Receiver<Stamped<Point2D>>,
) -> Result<LocationFusionModule, FusionError> {
    config.validate()?;
    let filter = Arc::new(ParticleFilter::new(config.filter.clone())?);
    let bus = EventBus::new(config.bus_capacity);
    let (fused_tx, robot_on_map) = mpsc::channel(config.output_capacity);
    info!(
        service = %config.service_name,
        count = config.filter.count,
        "starting location fusion"
    );
    let handle = start_location_fusion(
        robot_on_odometry,
        beacon_on_map,
        fused_tx,
        filter,
        Some(bus.clone()),
    );
    Ok(LocationFusionModule {
        handle,
        robot_on_map,
        bus,
    })
}

/// Publishes filter output shared by both tasks.
#[derive(Clone)]
struct Reporter {
    filter: Arc<ParticleFilter>,
    bus: Option<EventBus>,
    /// Last convergence state published.
    convergent: Arc<AtomicBool>,
}

impl Reporter {
    fn convergence(&self) {
        let now = self.filter.is_convergent();
        if self.convergent.swap(now, Ordering::AcqRel) == now {
            return;
        }
        let quality = self.filter.quality();
        info!(convergent = now, quality = %quality.value, "location fusion convergence changed");
        if let Some(bus) = &self.bus {
            let _ = bus.publish_to(
                Topic::SystemAlerts,
                Event::new(
                    SOURCE,
                    EventPayload::ConvergenceChanged {
                        convergent: now,
                        quality,
                    },
                ),
            );
        }
    }

    fn fused_pose(&self, pose: Stamped<Pose>) {
        if let Some(bus) = &self.bus {
            let _ = bus.publish_to(Topic::FusedPose, Event::new(SOURCE, EventPayload::FusedPose(pose)));
        }
    }
}
