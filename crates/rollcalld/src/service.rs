//! Attendance service — the recognition pipeline and ledger bookkeeping.
//!
//! All collaborators are injected: detector and embedder adapters, the
//! SQLite store, and the credential file. Nothing here reaches for ambient
//! globals, so tests run against stub adapters and in-memory state.

use crate::error::ServiceError;
use chrono::{Datelike, Duration, Local, NaiveDate};
use image::RgbImage;
use rollcall_core::{
    crop_face, single_face, sort_left_to_right, BoundingBox, FaceDetector, FaceEmbedder, Identity,
    L2Matcher, Matcher,
};
use rollcall_store::{AdminCredentialFile, AttendanceRecord, Store};
use serde::Serialize;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Label reported for a face that matched no enrolled identity.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Serialize)]
pub struct EnrollReceipt {
    pub message: String,
    pub faces_detected: u32,
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateReceipt {
    pub message: String,
    pub updated: bool,
}

/// One recognized (or unrecognized) face in a frame.
#[derive(Debug, Serialize)]
pub struct FaceSighting {
    pub name: String,
    pub bbox: BoundingBox,
    pub time: String,
}

#[derive(Debug, Serialize)]
pub struct RecognizeReport {
    pub faces: Vec<FaceSighting>,
}

#[derive(Debug, Serialize)]
pub struct WeeklyReport {
    pub dates: Vec<String>,
    pub counts: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct AbsentReport {
    pub count: usize,
    pub absent: Vec<String>,
}

pub struct AttendanceService {
    detector: Box<dyn FaceDetector + Send>,
    embedder: Box<dyn FaceEmbedder + Send>,
    matcher: L2Matcher,
    store: Store,
    admin: AdminCredentialFile,
    distance_threshold: f32,
}

impl AttendanceService {
    pub fn new(
        detector: Box<dyn FaceDetector + Send>,
        embedder: Box<dyn FaceEmbedder + Send>,
        store: Store,
        admin: AdminCredentialFile,
        distance_threshold: f32,
    ) -> Self {
        Self {
            detector,
            embedder,
            matcher: L2Matcher,
            store,
            admin,
            distance_threshold,
        }
    }

    /// Enroll a new identity from an image with exactly one face.
    ///
    /// An already-enrolled name is a conflict, not an overwrite: the index is
    /// left untouched and the caller must explicitly confirm via
    /// [`update_face`](Self::update_face).
    pub fn enroll(
        &mut self,
        name: &str,
        mobile: Option<String>,
        email: Option<String>,
        image: &RgbImage,
    ) -> Result<EnrollReceipt, ServiceError> {
        let name = require_name(name)?;

        let faces = self.detector.detect(image)?;
        let face = single_face(&faces)?;
        let embedding = self.embedder.embed(&crop_face(image, face))?;

        if self.store.identity_exists(name)? {
            return Err(ServiceError::IdentityConflict(name.to_string()));
        }

        self.store.insert_identity(&Identity {
            name: name.to_string(),
            mobile,
            email,
            embedding,
        })?;
        tracing::info!(name, "identity enrolled");

        Ok(EnrollReceipt {
            message: format!("'{name}' enrolled successfully."),
            faces_detected: 1,
            updated: false,
        })
    }

    /// Replace the stored embedding for an existing identity. Contact
    /// metadata stays as it was.
    pub fn update_face(
        &mut self,
        name: &str,
        image: &RgbImage,
    ) -> Result<UpdateReceipt, ServiceError> {
        let name = require_name(name)?;

        let faces = self.detector.detect(image)?;
        let face = single_face(&faces)?;
        let embedding = self.embedder.embed(&crop_face(image, face))?;

        if !self.store.update_embedding(name, &embedding)? {
            return Err(ServiceError::IdentityNotFound(name.to_string()));
        }
        tracing::info!(name, "facial data updated");

        Ok(UpdateReceipt {
            message: format!("Facial data for '{name}' updated successfully."),
            updated: true,
        })
    }

    /// Recognize every face in the image at the current wall-clock time and
    /// record attendance for each match.
    pub fn recognize(&mut self, image: &RgbImage) -> Result<RecognizeReport, ServiceError> {
        let now = Local::now();
        self.recognize_at(
            image,
            &now.format(DATE_FORMAT).to_string(),
            &now.format(TIME_FORMAT).to_string(),
        )
    }

    /// Recognition at an explicit timestamp; one timestamp covers every face
    /// in the call.
    ///
    /// Faces are processed independently, left to right. Each face that
    /// matches an enrolled identity drives the ledger transition; an
    /// unmatched face is reported as [`UNKNOWN_LABEL`] and touches nothing.
    pub fn recognize_at(
        &mut self,
        image: &RgbImage,
        date: &str,
        time: &str,
    ) -> Result<RecognizeReport, ServiceError> {
        let mut faces = self.detector.detect(image)?;
        if faces.is_empty() {
            return Err(ServiceError::NoFaceDetected);
        }
        sort_left_to_right(&mut faces);

        let gallery = self.store.all_identities()?;
        let mut sightings = Vec::with_capacity(faces.len());

        for face in &faces {
            let embedding = self.embedder.embed(&crop_face(image, face))?;
            let result = self
                .matcher
                .best_match(&embedding, &gallery, self.distance_threshold);

            let name = match result.name {
                Some(name) => {
                    self.store.mark_seen(&name, date, time)?;
                    tracing::debug!(name, distance = result.distance, "attendance marked");
                    name
                }
                None => UNKNOWN_LABEL.to_string(),
            };

            sightings.push(FaceSighting {
                name,
                bbox: face.clone(),
                time: time.to_string(),
            });
        }

        Ok(RecognizeReport { faces: sightings })
    }

    /// Check a candidate admin secret. Always a boolean outcome.
    pub fn verify_admin(&self, candidate: &str) -> Result<bool, ServiceError> {
        Ok(self.admin.verify(candidate)?)
    }

    /// Rotate the admin secret. The stored hash changes only when the old
    /// secret verifies.
    pub fn change_admin_password(&self, old: &str, new: &str) -> Result<String, ServiceError> {
        if new.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "new password must not be empty".into(),
            ));
        }
        if !self.admin.verify(old)? {
            return Err(ServiceError::InvalidCredential);
        }
        self.admin.set(new)?;
        tracing::info!("admin password changed");
        Ok("Password updated successfully.".to_string())
    }

    pub fn present_today_count(&self) -> Result<i64, ServiceError> {
        Ok(self.store.present_count(&today_string())?)
    }

    pub fn total_enrolled_count(&self) -> Result<i64, ServiceError> {
        Ok(self.store.enrolled_count()?)
    }

    /// Seven (date, count) pairs for the week `offset` weeks away from the
    /// current one, Monday-aligned.
    pub fn weekly_attendance(&self, offset: i64) -> Result<WeeklyReport, ServiceError> {
        let dates = week_dates(Local::now().date_naive(), offset);
        let counts = self.store.week_counts(&dates)?;
        Ok(WeeklyReport {
            dates: dates.to_vec(),
            counts: counts.to_vec(),
        })
    }

    /// Enrolled identities with no attendance record today.
    pub fn absent_today(&self) -> Result<AbsentReport, ServiceError> {
        let absent = self.store.absent_names(&today_string())?;
        Ok(AbsentReport {
            count: absent.len(),
            absent,
        })
    }

    /// Full ledger contents, for export.
    pub fn all_records(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(self.store.all_records()?)
    }
}

fn require_name(name: &str) -> Result<&str, ServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidRequest("name must not be empty".into()));
    }
    Ok(trimmed)
}

fn today_string() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// The seven dates Monday..Sunday of the week `offset` weeks away from the
/// week containing `today`.
fn week_dates(today: NaiveDate, offset: i64) -> [String; 7] {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64)
        + Duration::days(7 * offset);
    std::array::from_fn(|i| {
        (monday + Duration::days(i as i64))
            .format(DATE_FORMAT)
            .to_string()
    })
}
