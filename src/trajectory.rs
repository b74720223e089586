use crate::pose::Pose;

/// Append-only camera pose history, indexed by integer frame time.
#[derive(Clone, Debug)]
pub struct Trajectory {
    camera_to_world: Vec<Pose>,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            camera_to_world: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, camera_to_world: Pose) {
        self.camera_to_world.push(camera_to_world);
    }

    /// Clears the history and restarts it from `initial`.
    pub fn restart(&mut self, initial: Pose) {
        self.camera_to_world.clear();
        self.camera_to_world.push(initial);
    }

    pub fn len(&self) -> usize {
        self.camera_to_world.len()
    }

    pub fn is_empty(&self) -> bool {
        self.camera_to_world.is_empty()
    }

    pub fn latest(&self) -> &Pose {
        &self.camera_to_world[self.camera_to_world.len() - 1]
    }

    /// Pose at frame `time`. Out-of-range times, negative or past the end,
    /// return the latest pose.
    pub fn get(&self, time: i64) -> &Pose {
        if time < 0 || time as usize >= self.camera_to_world.len() {
            return self.latest();
        }
        &self.camera_to_world[time as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pose> + '_ {
        self.camera_to_world.iter()
    }
}
