//! Synthetic test data for the courses service.
//!
//! # Design
//! A `Generator` owns a `StdRng`. Seeded generators are fully reproducible:
//! every record, including ids, idempotency keys and timestamps, is derived
//! from the seed. Timestamps are a fixed base plus a random offset, never the
//! wall clock.
//!
//! This crate only knows the record types from `courses_core::types`; it has
//! no path to the transport or the client.

use chrono::{DateTime, TimeDelta, Utc};
use courses_core::types::{
    CourseRecord, EnrollmentRequest, IdempotencyKey, Level, NewCourse, NewGroup, NewStudent,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

const LANGUAGES: &[&str] = &[
    "English", "German", "French", "Spanish", "Italian", "Portuguese", "Polish", "Czech",
    "Swedish", "Finnish", "Chinese", "Japanese", "Korean", "Arabic", "Turkish", "Greek",
];

const TOPICS: &[&str] = &[
    "for beginners", "for travellers", "for business", "for IT", "grammar intensive",
    "conversation club", "exam preparation", "through films", "pronunciation workshop",
];

const FIRST_NAMES: &[&str] = &[
    "Anna", "Ivan", "Olga", "Mikhail", "Elena", "Dmitry", "Sofia", "Pavel", "Maria", "Alexei",
    "Irina", "Sergei", "Noa", "Jan", "Lena", "Ravi",
];

const LAST_NAMES: &[&str] = &[
    "Ivanova", "Petrov", "Smirnova", "Kuznetsov", "Popova", "Sokolov", "Novak", "Lindqvist",
    "Moreau", "Rossi", "Garcia", "Kowalski",
];

const GROUP_WORDS: &[&str] = &[
    "Alpha", "Aurora", "Beacon", "Cedar", "Comet", "Delta", "Harbor", "Maple", "Nova", "Orbit",
    "Quartz", "Summit", "Vector", "Zenith",
];

const SCHEDULES: &[&str] = &[
    "Mon-Wed-Fri 9:00", "Tue-Thu 18:00", "Sat 11:00", "Sun 15:00", "Mon-Wed 19:30", "Daily 8:00",
];

/// 2024-01-01T00:00:00Z.
const BASE_EPOCH_SECS: i64 = 1_704_067_200;
/// Offsets stay within one year of the base.
const SPAN_SECS: i64 = 365 * 24 * 60 * 60;

/// Which record `generate` should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Course,
    NewCourse,
    Student,
    Group { course_id: Uuid },
    Enrollment { student_id: Uuid, course_id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticRecord {
    Course(CourseRecord),
    NewCourse(NewCourse),
    Student(NewStudent),
    Group(NewGroup),
    Enrollment(EnrollmentRequest),
}

/// One record of `kind` from a fresh generator seeded with `seed`.
pub fn generate(kind: RecordKind, seed: u64) -> SyntheticRecord {
    Generator::seeded(seed).record(kind)
}

#[derive(Debug, Clone)]
pub struct Generator {
    rng: StdRng,
}

impl Generator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed drawn from the thread-local RNG.
    pub fn unseeded() -> Self {
        Self::seeded(rand::rng().random())
    }

    pub fn record(&mut self, kind: RecordKind) -> SyntheticRecord {
        match kind {
            RecordKind::Course => SyntheticRecord::Course(self.course()),
            RecordKind::NewCourse => SyntheticRecord::NewCourse(self.new_course()),
            RecordKind::Student => SyntheticRecord::Student(self.student()),
            RecordKind::Group { course_id } => SyntheticRecord::Group(self.group(course_id)),
            RecordKind::Enrollment {
                student_id,
                course_id,
            } => SyntheticRecord::Enrollment(self.enrollment(student_id, course_id)),
        }
    }

    /// A catalogue entry as the service would return it.
    pub fn course(&mut self) -> CourseRecord {
        let id = self.uuid();
        let language = self.pick(LANGUAGES);
        CourseRecord {
            id,
            title: self.title(language),
            language: language.to_string(),
            level: self.level(),
            schedule: self.pick(SCHEDULES).to_string(),
        }
    }

    pub fn new_course(&mut self) -> NewCourse {
        let language = self.pick(LANGUAGES);
        let level = self.level();
        NewCourse {
            title: self.title(language),
            description: format!("{language} course at level {level}"),
            language: language.to_string(),
            level,
            schedule: self.pick(SCHEDULES).to_string(),
            created_at: self.timestamp(),
        }
    }

    pub fn student(&mut self) -> NewStudent {
        let first_name = self.pick(FIRST_NAMES);
        let last_name = self.pick(LAST_NAMES);
        let tag: u32 = self.rng.random_range(1..100_000);
        NewStudent {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!(
                "{}.{}{tag}@example.com",
                first_name.to_lowercase(),
                last_name.to_lowercase()
            ),
            registered_at: self.timestamp(),
        }
    }

    /// Two weekly slots, each starting on the hour between 9:00 and 16:00.
    pub fn group(&mut self, course_id: Uuid) -> NewGroup {
        let name = format!("{} Group", self.pick(GROUP_WORDS));
        let first: u8 = self.rng.random_range(9..17);
        let second: u8 = self.rng.random_range(9..17);
        NewGroup {
            name,
            course_id,
            schedule: vec![
                format!("Mon-Wed-Fri {first}:00"),
                format!("Tue-Thu {second}:00"),
            ],
        }
    }

    /// The idempotency key comes from the generator too, so a seeded
    /// enrollment replays with the same key.
    pub fn enrollment(&mut self, student_id: Uuid, course_id: Uuid) -> EnrollmentRequest {
        EnrollmentRequest {
            student_id,
            course_id,
            requested_at: self.timestamp(),
            idempotency_key: IdempotencyKey::from_uuid(self.uuid()),
        }
    }

    fn title(&mut self, language: &str) -> String {
        format!("{language} {}", self.pick(TOPICS))
    }

    fn level(&mut self) -> Level {
        Level::ALL[self.rng.random_range(0..Level::ALL.len())]
    }

    fn pick(&mut self, words: &[&'static str]) -> &'static str {
        words[self.rng.random_range(0..words.len())]
    }

    fn uuid(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.random()).into_uuid()
    }

    fn timestamp(&mut self) -> DateTime<Utc> {
        let offset = self.rng.random_range(0..SPAN_SECS);
        DateTime::UNIX_EPOCH + TimeDelta::seconds(BASE_EPOCH_SECS + offset)
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::unseeded()
    }
}
