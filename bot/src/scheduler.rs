use crate::scanner::Scanner;
use anyhow::Result;
use log::{error, info, warn};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Upper bound of the random delay after each tick, giving ±30 s around the midpoint.
const MAX_OFFSET_SECS: f64 = 60.0;

pub(crate) struct Scheduler {
    scanner: Arc<Mutex<Scanner>>,
    scheduler: JobScheduler,
    stop: Arc<Notify>,
}

impl Scheduler {
    pub(crate) async fn new(scanner: Scanner) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Scheduler {
            scanner: Arc::new(Mutex::new(scanner)),
            scheduler,
            stop: Arc::new(Notify::new()),
        })
    }

    pub(crate) async fn schedule_task<F, Fut>(&self, schedule: &str, task: F) -> Result<()>
    where
        F: Fn(Arc<Mutex<Scanner>>, Arc<Notify>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let scanner = self.scanner.clone();
        let stop = self.stop.clone();

        self.scheduler
            .add(Job::new_async(schedule, move |_uuid, _l| {
                let fut = task(scanner.clone(), stop.clone());
                Box::pin(async move {
                    if let Err(e) = fut.await {
                        error!("Error executing scheduled task: {:?}", e);
                    }
                })
            })?)
            .await?;

        Ok(())
    }

    async fn schedule_scans(&self, interval_minutes: u32) -> Result<()> {
        let schedule = format!("every {interval_minutes} minutes");
        self.schedule_task(&schedule, |scanner, stop| async move {
            let offset = rand::thread_rng().gen_range(0.0..MAX_OFFSET_SECS);
            sleep(Duration::from_secs_f64(offset)).await;

            // a scan still running from the previous tick wins
            let Ok(mut scanner) = scanner.try_lock() else {
                warn!("Previous scan still running, skipping this one");
                return Ok(());
            };

            if let Err(e) = scanner.run_scan().await {
                if e.downcast_ref::<fcmarket::Error>().is_some_and(fcmarket::Error::is_fatal) {
                    stop.notify_one();
                }
                return Err(e);
            }
            Ok(())
        })
        .await
    }

    /// Runs one scan now, then every `interval_minutes` until Ctrl-C or the
    /// session expires.
    pub(crate) async fn start(self, interval_minutes: u32) -> Result<()> {
        let first = self.scanner.lock().await.run_scan().await;
        if let Err(e) = first {
            if e.downcast_ref::<fcmarket::Error>().is_some_and(fcmarket::Error::is_fatal) {
                return Err(e);
            }
            error!("Initial scan failed: {e}");
        }

        self.schedule_scans(interval_minutes).await?;
        self.scheduler.start().await?;
        info!("Scanning every {interval_minutes} minutes, Ctrl-C to stop");

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Stopping scanner");
            }
            _ = self.stop.notified() => warn!("Session expired, stopping scanner"),
        }

        let mut scheduler = self.scheduler;
        scheduler.shutdown().await?;
        self.scanner.lock().await.save_history();
        Ok(())
    }
}
