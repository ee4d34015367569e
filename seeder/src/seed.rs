//! Populate a courses service with synthetic data.
//!
//! # Design
//! A run goes through four phases in order: courses, students, groups, then
//! enrollments. Groups are spread round-robin over the courses created in the
//! same run; enrollments pair students with groups round-robin and enroll the
//! student in the group's course. A failed creation is logged and counted,
//! never fatal. In a sequential run a phase that creates nothing ends the
//! run, since every later phase needs its output.
//!
//! The concurrent run splits the total into one share per worker thread.
//! Workers share the client (and its connection pool) by reference, each has
//! its own generator, and their counts are summed into atomic totals. A
//! worker does not stop at an empty phase: it skips only the phases whose
//! input is missing, so a worker without courses still creates students.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use courses_core::{ApiError, CoursesClient, Sleeper, Transport};
use courses_synth::Generator;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Courses,
    Students,
    Groups,
    Enrollments,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Courses,
        Phase::Students,
        Phase::Groups,
        Phase::Enrollments,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Courses => "courses",
            Phase::Students => "students",
            Phase::Groups => "groups",
            Phase::Enrollments => "enrollments",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target and actual count for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub target: usize,
    pub created: usize,
}

impl Tally {
    pub fn failed(&self) -> usize {
        self.target.saturating_sub(self.created)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub courses: Tally,
    pub students: Tally,
    pub groups: Tally,
    pub enrollments: Tally,
    pub elapsed: Duration,
}

impl SeedReport {
    fn with_target(target: usize) -> Self {
        let tally = Tally { target, created: 0 };
        Self {
            courses: tally,
            students: tally,
            groups: tally,
            enrollments: tally,
            elapsed: Duration::ZERO,
        }
    }

    pub fn tally(&self, phase: Phase) -> Tally {
        match phase {
            Phase::Courses => self.courses,
            Phase::Students => self.students,
            Phase::Groups => self.groups,
            Phase::Enrollments => self.enrollments,
        }
    }

    fn tally_mut(&mut self, phase: Phase) -> &mut Tally {
        match phase {
            Phase::Courses => &mut self.courses,
            Phase::Students => &mut self.students,
            Phase::Groups => &mut self.groups,
            Phase::Enrollments => &mut self.enrollments,
        }
    }

    /// Records that were targeted but not created, over all phases.
    pub fn failures(&self) -> usize {
        Phase::ALL.iter().map(|&p| self.tally(p).failed()).sum()
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for phase in Phase::ALL {
            let tally = self.tally(phase);
            write!(f, "{phase} {}/{}, ", tally.created, tally.target)?;
        }
        write!(f, "in {}ms", self.elapsed.as_millis())
    }
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("thread count must be at least 1")]
    NoThreads,

    #[error("no {phase} created out of {target}; seeding aborted")]
    NothingCreated {
        phase: Phase,
        target: usize,
        report: Box<SeedReport>,
    },
}

/// Counters shared by concurrent workers.
#[derive(Debug, Default)]
struct Totals {
    created: [AtomicUsize; 4],
}

impl Totals {
    fn add(&self, report: &SeedReport) {
        for (slot, phase) in self.created.iter().zip(Phase::ALL) {
            slot.fetch_add(report.tally(phase).created, Ordering::Relaxed);
        }
    }

    fn report(&self, target: usize, elapsed: Duration) -> SeedReport {
        let mut report = SeedReport::with_target(target);
        for (slot, phase) in self.created.iter().zip(Phase::ALL) {
            report.tally_mut(phase).created = slot.load(Ordering::Relaxed);
        }
        report.elapsed = elapsed;
        report
    }
}

/// What a share does when a phase creates nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnEmpty {
    /// Stop before the next phase.
    Abort,
    /// Keep going; skip phases that have no input.
    SkipDependents,
}

/// Split `total` into `threads` shares; the first `total % threads` shares
/// get one extra.
pub fn split_shares(total: usize, threads: usize) -> Vec<usize> {
    if threads == 0 {
        return Vec::new();
    }
    let base = total / threads;
    let remainder = total % threads;
    (0..threads)
        .map(|i| base + usize::from(i < remainder))
        .collect()
}

pub struct Seeder<'a, T, S> {
    client: &'a CoursesClient<T, S>,
    seed: Option<u64>,
}

impl<'a, T: Transport, S: Sleeper> Seeder<'a, T, S> {
    pub fn new(client: &'a CoursesClient<T, S>) -> Self {
        Self { client, seed: None }
    }

    /// Make generated data reproducible. Worker `n` of a concurrent run uses
    /// `seed + n`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn generator(&self, worker: u64) -> Generator {
        match self.seed {
            Some(seed) => Generator::seeded(seed.wrapping_add(worker)),
            None => Generator::unseeded(),
        }
    }

    /// Create `total` records of each kind on the calling thread.
    pub fn run_sequential(&self, total: usize) -> Result<SeedReport, SeedError> {
        info!(total, "starting sequential seeding");
        let started = Instant::now();
        let mut generator = self.generator(0);

        let (mut report, aborted) = self.run_share(&mut generator, total, OnEmpty::Abort);
        report.elapsed = started.elapsed();

        if let Some(phase) = aborted {
            error!(%phase, "nothing created; aborting sequential seeding");
            return Err(SeedError::NothingCreated {
                phase,
                target: total,
                report: Box::new(report),
            });
        }
        info!(%report, "finished sequential seeding");
        Ok(report)
    }

    /// Create `total` records of each kind across `threads` workers.
    pub fn run_concurrent(&self, total: usize, threads: usize) -> Result<SeedReport, SeedError> {
        if threads == 0 {
            return Err(SeedError::NoThreads);
        }
        info!(total, threads, "starting concurrent seeding");
        let started = Instant::now();
        let totals = Totals::default();

        std::thread::scope(|scope| {
            for (worker, share) in split_shares(total, threads).into_iter().enumerate() {
                if share == 0 {
                    continue;
                }
                let totals = &totals;
                scope.spawn(move || {
                    let _span = info_span!("worker", id = worker + 1).entered();
                    info!(share, "worker starting");
                    let worker_started = Instant::now();
                    let mut generator = self.generator(worker as u64);

                    let (report, empty) =
                        self.run_share(&mut generator, share, OnEmpty::SkipDependents);
                    totals.add(&report);
                    if let Some(phase) = empty {
                        warn!(%phase, "nothing created; worker skipped the phases that need it");
                    }
                    info!(
                        elapsed_ms = worker_started.elapsed().as_millis() as u64,
                        %report,
                        "worker finished"
                    );
                });
            }
        });

        let report = totals.report(total, started.elapsed());
        if total > 0 && report.courses.created == 0 {
            error!("no worker created any course");
            return Err(SeedError::NothingCreated {
                phase: Phase::Courses,
                target: total,
                report: Box::new(report),
            });
        }
        info!(%report, "finished concurrent seeding");
        Ok(report)
    }

    /// Run every phase for one share. Returns the report and the first phase
    /// that created nothing, if any.
    fn run_share(
        &self,
        generator: &mut Generator,
        share: usize,
        on_empty: OnEmpty,
    ) -> (SeedReport, Option<Phase>) {
        let mut report = SeedReport::with_target(share);
        let mut first_empty = None;
        let client = self.client;

        let mut finish = |phase: Phase, created: usize| -> bool {
            if share > 0 && created == 0 && first_empty.is_none() {
                first_empty = Some(phase);
            }
            first_empty.is_some() && on_empty == OnEmpty::Abort
        };

        let courses = run_phase(Phase::Courses, share, |_| {
            client.create_course(&generator.new_course()).map(|c| c.id)
        });
        report.courses.created = courses.len();
        if finish(Phase::Courses, courses.len()) {
            return (report, first_empty);
        }

        let students = run_phase(Phase::Students, share, |_| {
            client.create_student(&generator.student()).map(|s| s.id)
        });
        report.students.created = students.len();
        if finish(Phase::Students, students.len()) {
            return (report, first_empty);
        }

        let groups = if courses.is_empty() {
            Vec::new()
        } else {
            run_phase(Phase::Groups, share, |i| {
                let course_id = courses[i % courses.len()];
                client
                    .create_group(&generator.group(course_id))
                    .map(|g| (g.id, g.course_id))
            })
        };
        report.groups.created = groups.len();
        if finish(Phase::Groups, groups.len()) {
            return (report, first_empty);
        }

        if !students.is_empty() && !groups.is_empty() {
            let enrollments = run_phase(Phase::Enrollments, share, |i| {
                let student_id: Uuid = students[i % students.len()];
                let (_, course_id) = groups[i % groups.len()];
                client.enroll(&generator.enrollment(student_id, course_id))
            });
            report.enrollments.created = enrollments.len();
            finish(Phase::Enrollments, enrollments.len());
        }

        (report, first_empty)
    }
}

/// Call `create` for `0..target`, keeping the successes.
fn run_phase<R>(
    phase: Phase,
    target: usize,
    mut create: impl FnMut(usize) -> Result<R, ApiError>,
) -> Vec<R> {
    debug!(%phase, target, "creating");
    let started = Instant::now();
    let step = (target / 10).max(1);
    let mut created = Vec::with_capacity(target);

    for i in 0..target {
        match create(i) {
            Ok(record) => created.push(record),
            Err(err) => warn!(%phase, index = i, error = %err, "creation failed"),
        }
        if (i + 1) % step == 0 {
            debug!(%phase, "created {}/{target}", i + 1);
        }
    }

    info!(
        %phase,
        target,
        actual = created.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "phase finished"
    );
    created
}
