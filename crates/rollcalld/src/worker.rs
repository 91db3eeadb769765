//! Service worker thread.
//!
//! The detector and embedder sessions are mutable and the store has no
//! built-in isolation, so every operation runs on one dedicated OS thread
//! that owns the [`AttendanceService`]. D-Bus handlers talk to it through a
//! clone-safe handle over an mpsc channel with oneshot replies; that channel
//! is the single-writer serialization the shared resources require.

use crate::error::ServiceError;
use crate::service::{
    AbsentReport, AttendanceService, EnrollReceipt, RecognizeReport, UpdateReceipt, WeeklyReport,
};
use image::RgbImage;
use rollcall_store::AttendanceRecord;
use tokio::sync::{mpsc, oneshot};

enum ServiceRequest {
    Enroll {
        name: String,
        mobile: Option<String>,
        email: Option<String>,
        image_path: String,
        reply: oneshot::Sender<Result<EnrollReceipt, ServiceError>>,
    },
    UpdateFace {
        name: String,
        image_path: String,
        reply: oneshot::Sender<Result<UpdateReceipt, ServiceError>>,
    },
    Recognize {
        image_path: String,
        reply: oneshot::Sender<Result<RecognizeReport, ServiceError>>,
    },
    VerifyAdmin {
        candidate: String,
        reply: oneshot::Sender<Result<bool, ServiceError>>,
    },
    ChangePassword {
        old: String,
        new: String,
        reply: oneshot::Sender<Result<String, ServiceError>>,
    },
    PresentToday {
        reply: oneshot::Sender<Result<i64, ServiceError>>,
    },
    TotalEnrolled {
        reply: oneshot::Sender<Result<i64, ServiceError>>,
    },
    Weekly {
        offset: i64,
        reply: oneshot::Sender<Result<WeeklyReport, ServiceError>>,
    },
    AbsentToday {
        reply: oneshot::Sender<Result<AbsentReport, ServiceError>>,
    },
    AllRecords {
        reply: oneshot::Sender<Result<Vec<AttendanceRecord>, ServiceError>>,
    },
}

/// Clone-safe handle to the service thread.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<ServiceRequest>,
}

macro_rules! ask {
    ($self:ident, $request:expr) => {{
        let (reply_tx, reply_rx) = oneshot::channel();
        $self
            .tx
            .send($request(reply_tx))
            .await
            .map_err(|_| ServiceError::WorkerGone)?;
        reply_rx.await.map_err(|_| ServiceError::WorkerGone)?
    }};
}

impl ServiceHandle {
    pub async fn enroll(
        &self,
        name: String,
        mobile: Option<String>,
        email: Option<String>,
        image_path: String,
    ) -> Result<EnrollReceipt, ServiceError> {
        ask!(self, |reply| ServiceRequest::Enroll {
            name,
            mobile,
            email,
            image_path,
            reply,
        })
    }

    pub async fn update_face(
        &self,
        name: String,
        image_path: String,
    ) -> Result<UpdateReceipt, ServiceError> {
        ask!(self, |reply| ServiceRequest::UpdateFace { name, image_path, reply })
    }

    pub async fn recognize(&self, image_path: String) -> Result<RecognizeReport, ServiceError> {
        ask!(self, |reply| ServiceRequest::Recognize { image_path, reply })
    }

    pub async fn verify_admin(&self, candidate: String) -> Result<bool, ServiceError> {
        ask!(self, |reply| ServiceRequest::VerifyAdmin { candidate, reply })
    }

    pub async fn change_password(&self, old: String, new: String) -> Result<String, ServiceError> {
        ask!(self, |reply| ServiceRequest::ChangePassword { old, new, reply })
    }

    pub async fn present_today(&self) -> Result<i64, ServiceError> {
        ask!(self, |reply| ServiceRequest::PresentToday { reply })
    }

    pub async fn total_enrolled(&self) -> Result<i64, ServiceError> {
        ask!(self, |reply| ServiceRequest::TotalEnrolled { reply })
    }

    pub async fn weekly(&self, offset: i64) -> Result<WeeklyReport, ServiceError> {
        ask!(self, |reply| ServiceRequest::Weekly { offset, reply })
    }

    pub async fn absent_today(&self) -> Result<AbsentReport, ServiceError> {
        ask!(self, |reply| ServiceRequest::AbsentToday { reply })
    }

    pub async fn all_records(&self) -> Result<Vec<AttendanceRecord>, ServiceError> {
        ask!(self, |reply| ServiceRequest::AllRecords { reply })
    }
}

/// Spawn the service on a dedicated OS thread and return its handle.
pub fn spawn_service(mut service: AttendanceService) -> ServiceHandle {
    let (tx, mut rx) = mpsc::channel::<ServiceRequest>(8);

    std::thread::Builder::new()
        .name("rollcall-service".into())
        .spawn(move || {
            tracing::info!("service thread started");
            while let Some(request) = rx.blocking_recv() {
                handle_request(&mut service, request);
            }
            tracing::info!("service thread exiting");
        })
        .expect("failed to spawn service thread");

    ServiceHandle { tx }
}

fn handle_request(service: &mut AttendanceService, request: ServiceRequest) {
    match request {
        ServiceRequest::Enroll { name, mobile, email, image_path, reply } => {
            let result = load_image(&image_path)
                .and_then(|image| service.enroll(&name, mobile, email, &image));
            let _ = reply.send(result);
        }
        ServiceRequest::UpdateFace { name, image_path, reply } => {
            let result =
                load_image(&image_path).and_then(|image| service.update_face(&name, &image));
            let _ = reply.send(result);
        }
        ServiceRequest::Recognize { image_path, reply } => {
            let result = load_image(&image_path).and_then(|image| service.recognize(&image));
            let _ = reply.send(result);
        }
        ServiceRequest::VerifyAdmin { candidate, reply } => {
            let _ = reply.send(service.verify_admin(&candidate));
        }
        ServiceRequest::ChangePassword { old, new, reply } => {
            let _ = reply.send(service.change_admin_password(&old, &new));
        }
        ServiceRequest::PresentToday { reply } => {
            let _ = reply.send(service.present_today_count());
        }
        ServiceRequest::TotalEnrolled { reply } => {
            let _ = reply.send(service.total_enrolled_count());
        }
        ServiceRequest::Weekly { offset, reply } => {
            let _ = reply.send(service.weekly_attendance(offset));
        }
        ServiceRequest::AbsentToday { reply } => {
            let _ = reply.send(service.absent_today());
        }
        ServiceRequest::AllRecords { reply } => {
            let _ = reply.send(service.all_records());
        }
    }
}

/// Decode an image file into RGB pixels. Decoding happens at this boundary;
/// the service itself only ever sees pixel data.
fn load_image(path: &str) -> Result<RgbImage, ServiceError> {
    match image::open(path) {
        Ok(img) => Ok(img.to_rgb8()),
        Err(source) => Err(ServiceError::ImageLoad { path: path.to_string(), source }),
    }
}
