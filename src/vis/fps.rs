use std::time::Instant;

/// Frame rate bookkeeping for the FPS overlay.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    start: Instant,
    last_frame: Instant,
    current_fps: f64,
    frame_count: u64,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            start: now,
            last_frame: now,
            current_fps: 0.0,
            frame_count: 0,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.frame_count += 1;
        let frame_time = now.duration_since(self.last_frame).as_secs_f64();
        if frame_time > 0.0 {
            self.current_fps = 1.0 / frame_time;
        }
        self.last_frame = now;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn average_fps(&self, now: Instant) -> f64 {
        let elapsed = now.duration_since(self.start).as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.frame_count as f64 / elapsed
    }

    pub fn overlay_lines(&self, now: Instant) -> [String; 3] {
        [
            format!("Frame Count: {}", self.frame_count),
            format!("Current FPS: {:.2}", self.current_fps()),
            format!("Average FPS: {:.2}", self.average_fps(now)),
        ]
    }
}
