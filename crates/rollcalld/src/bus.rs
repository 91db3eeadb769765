use crate::error::ServiceError;
use crate::worker::ServiceHandle;
use zbus::interface;

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Images are passed as file paths and decoded daemon-side. Structured
/// results are returned as JSON strings; optional string arguments use the
/// empty string as "absent" (D-Bus has no nullable types).
pub struct AttendanceBus {
    handle: ServiceHandle,
}

impl AttendanceBus {
    pub fn new(handle: ServiceHandle) -> Self {
        Self { handle }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceBus {
    /// Enroll a new identity from an image containing exactly one face.
    async fn enroll(
        &self,
        name: &str,
        mobile: &str,
        email: &str,
        image_path: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, "enroll requested");
        let receipt = self
            .handle
            .enroll(
                name.to_string(),
                non_empty(mobile),
                non_empty(email),
                image_path.to_string(),
            )
            .await
            .map_err(to_fdo)?;
        to_json(&receipt)
    }

    /// Replace the stored facial data for an existing identity.
    async fn update_face(&self, name: &str, image_path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "update_face requested");
        let receipt = self
            .handle
            .update_face(name.to_string(), image_path.to_string())
            .await
            .map_err(to_fdo)?;
        to_json(&receipt)
    }

    /// Recognize every face in the image and record attendance for matches.
    async fn recognize(&self, image_path: &str) -> zbus::fdo::Result<String> {
        let report = self
            .handle
            .recognize(image_path.to_string())
            .await
            .map_err(to_fdo)?;
        to_json(&report)
    }

    /// Check an admin secret; boolean result, never an error.
    async fn verify_admin(&self, candidate: &str) -> zbus::fdo::Result<bool> {
        self.handle
            .verify_admin(candidate.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Rotate the admin secret; fails unless the old secret verifies.
    async fn change_admin_password(&self, old: &str, new: &str) -> zbus::fdo::Result<String> {
        self.handle
            .change_password(old.to_string(), new.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Number of identities seen today.
    async fn present_today_count(&self) -> zbus::fdo::Result<i64> {
        self.handle.present_today().await.map_err(to_fdo)
    }

    /// Number of enrolled identities.
    async fn total_enrolled_count(&self) -> zbus::fdo::Result<i64> {
        self.handle.total_enrolled().await.map_err(to_fdo)
    }

    /// Seven Monday-aligned (date, count) pairs for the offset week.
    async fn weekly_attendance(&self, offset: i64) -> zbus::fdo::Result<String> {
        let report = self.handle.weekly(offset).await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Enrolled identities with no attendance record today.
    async fn absent_today(&self) -> zbus::fdo::Result<String> {
        let report = self.handle.absent_today().await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Every attendance record, for export.
    async fn all_records(&self) -> zbus::fdo::Result<String> {
        let records = self.handle.all_records().await.map_err(to_fdo)?;
        to_json(&records)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let enrolled = self.handle.total_enrolled().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "total_enrolled": enrolled,
        })
        .to_string())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value)
        .map_err(|e| zbus::fdo::Error::Failed(format!("serialize response: {e}")))
}

/// Service errors cross D-Bus as `Failed` with the error kind in the text;
/// the caller-facing taxonomy stays intact without a custom error type per
/// variant.
fn to_fdo(err: ServiceError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}
