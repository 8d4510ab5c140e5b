//! Batch run over a range of archive records.
//!
//! Records are handled one at a time: fetch, parse, filter, locate. Fetch and
//! parse problems only skip the record; records that cannot be located end
//! up in the failure list of the [`RunReport`].

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::archive::{parse_record, RecordFilter, RecordSource, Rejection};
use crate::models::{Failure, Record, ResultEntry};
use crate::projection::LocalProjection;
use crate::resolver::{locate, BufferSchedule, BufferStrategy, Outcome, PlaceResolver};

/// What happened to a single record id
#[derive(Debug)]
pub enum Processed {
    /// Network error or non-200 response
    Unavailable,
    /// Payload was not a readable LIDO document
    Malformed,
    Rejected(Rejection),
    Located(ResultEntry),
    Failed(Failure),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub requested: usize,
    pub unavailable: usize,
    pub malformed: usize,
    pub rejected: usize,
    pub located: usize,
    pub failed: usize,
}

/// Everything a run produced, threaded through instead of kept in globals
#[derive(Debug, Default)]
pub struct RunReport {
    pub entries: Vec<ResultEntry>,
    pub failures: Vec<Failure>,
    pub stats: RunStats,
}

impl RunReport {
    fn tally(&mut self, processed: Processed) {
        self.stats.requested += 1;
        match processed {
            Processed::Unavailable => self.stats.unavailable += 1,
            Processed::Malformed => self.stats.malformed += 1,
            Processed::Rejected(_) => self.stats.rejected += 1,
            Processed::Located(entry) => {
                self.stats.located += 1;
                self.entries.push(entry);
            }
            Processed::Failed(failure) => {
                self.stats.failed += 1;
                self.failures.push(failure);
            }
        }
    }
}

pub struct Pipeline<S, R> {
    source: S,
    filter: RecordFilter,
    resolver: R,
    projection: LocalProjection,
    schedule: BufferSchedule,
    strategy: BufferStrategy,
}

impl<S: RecordSource, R: PlaceResolver> Pipeline<S, R> {
    pub fn new(
        source: S,
        filter: RecordFilter,
        resolver: R,
        projection: LocalProjection,
        schedule: BufferSchedule,
        strategy: BufferStrategy,
    ) -> Self {
        Self {
            source,
            filter,
            resolver,
            projection,
            schedule,
            strategy,
        }
    }

    /// Locate an already parsed record
    pub async fn locate_record(&mut self, record: &Record) -> Result<ResultEntry, Failure> {
        let outcome = locate(
            &mut self.resolver,
            &record.places,
            &self.schedule,
            self.strategy,
        )
        .await;

        match outcome {
            Outcome::Located {
                point,
                buffer,
                attempts,
            } => {
                let location = self.projection.point_to_lonlat(point);
                debug!(
                    "{} located at ({:.6}, {:.6}) with buffer {} after {} attempts",
                    record.id,
                    location.lat,
                    location.lon,
                    buffer,
                    attempts.len()
                );
                Ok(ResultEntry::new(record, location))
            }
            Outcome::Failed {
                kind,
                buffer,
                unresolved,
                ..
            } => Err(Failure {
                record_id: record.id.clone(),
                places: record.places.clone(),
                kind,
                buffer,
                unresolved,
            }),
        }
    }

    pub async fn process(&mut self, id: &str) -> Processed {
        let payload = match self.source.fetch(id).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping {}: {}", id, e);
                return Processed::Unavailable;
            }
        };

        let record = match parse_record(&payload) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping {}: unreadable LIDO payload: {}", id, e);
                return Processed::Malformed;
            }
        };

        if let Err(rejection) = self.filter.check(&record) {
            debug!("Filtered {}: {:?}", record.id, rejection);
            return Processed::Rejected(rejection);
        }

        match self.locate_record(&record).await {
            Ok(entry) => Processed::Located(entry),
            Err(failure) => {
                info!("{}", failure);
                Processed::Failed(failure)
            }
        }
    }

    /// Process every id in order
    pub async fn run(&mut self, ids: &[String]) -> RunReport {
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut report = RunReport::default();
        for id in ids {
            pb.set_message(id.clone());
            let processed = self.process(id).await;
            report.tally(processed);
            pb.inc(1);
        }
        pb.finish_with_message(format!(
            "{} located, {} failed",
            report.stats.located, report.stats.failed
        ));

        info!(
            "Run finished: {} requested, {} unavailable, {} malformed, {} filtered, {} located, {} failed",
            report.stats.requested,
            report.stats.unavailable,
            report.stats.malformed,
            report.stats.rejected,
            report.stats.located,
            report.stats.failed
        );
        report
    }
}
