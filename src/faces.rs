use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::face::DetectedFace;

/// Consistent view of the latest detection: the faces and the mirror flag
/// they were delivered with.
#[derive(Debug, Clone)]
pub struct FaceSnapshot {
    pub faces: Arc<[DetectedFace]>,
    pub mirrored: bool,
}

impl FaceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn is_multi_face(&self) -> bool {
        self.faces.len() > 1
    }
}

struct Shared {
    faces: Arc<[DetectedFace]>,
    mirrored: bool,
}

/// Latest faces from the detector, handed from the host's callback thread
/// to the render loop. Writers replace the whole list; readers take an
/// [`FaceSnapshot`] and draw from it without holding the lock.
pub struct FaceFrameBuffer {
    shared: Mutex<Shared>,
    max_faces: usize,
}

impl FaceFrameBuffer {
    pub fn new(max_faces: usize) -> Self {
        Self {
            shared: Mutex::new(Shared {
                faces: Arc::from(Vec::new()),
                mirrored: false,
            }),
            max_faces,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn replace(&self, mut faces: Vec<DetectedFace>, mirrored: bool) {
        if faces.len() > self.max_faces {
            debug!(
                "Dropping {} faces beyond the max of {}",
                faces.len() - self.max_faces,
                self.max_faces
            );
            faces.truncate(self.max_faces);
        }

        let faces: Arc<[DetectedFace]> = Arc::from(faces);
        let mut shared = self.lock();
        shared.faces = faces;
        shared.mirrored = mirrored;
    }

    /// Drops the current faces, e.g. once detection stops. The mirror flag
    /// is left alone.
    pub fn clear(&self) {
        self.lock().faces = Arc::from(Vec::new());
    }

    pub fn snapshot(&self) -> FaceSnapshot {
        let shared = self.lock();
        FaceSnapshot {
            faces: Arc::clone(&shared.faces),
            mirrored: shared.mirrored,
        }
    }

    /// Current mirror flag, re-read by the renderer before each face so a
    /// toggle applies to the remaining faces of the frame being drawn.
    pub fn is_mirrored(&self) -> bool {
        self.lock().mirrored
    }
}
