use crate::errors::TourError;

/// Identifies one engine state. Delayed work captures it and is dropped if the
/// engine has moved on by the time it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

#[derive(Debug, Clone)]
pub struct TourEngine {
    current_step_index: usize,
    is_open: bool,
    step_count: usize,
    generation: u64,
}

impl TourEngine {
    pub fn new(step_count: usize) -> Self {
        Self {
            current_step_index: 0,
            is_open: false,
            step_count,
            generation: 0,
        }
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn last_index(&self) -> usize {
        self.step_count.saturating_sub(1)
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step_index == self.last_index()
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation.0
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    pub fn check_index(&self, index: usize) -> Result<(), TourError> {
        if index < self.step_count {
            Ok(())
        } else {
            Err(TourError::StepOutOfRange { index, step_count: self.step_count })
        }
    }

    /// Shows the overlay, optionally jumping to `at` first.
    pub fn open(&mut self, at: Option<usize>) -> Result<(), TourError> {
        if let Some(index) = at {
            self.check_index(index)?;
            self.current_step_index = index;
        }
        self.is_open = true;
        self.bump();
        Ok(())
    }

    pub fn advance(&mut self, to: usize) -> Result<(), TourError> {
        self.check_index(to)?;
        self.current_step_index = to;
        self.bump();
        Ok(())
    }

    /// Hides the overlay. Returns `mark_completed` so the caller can persist it.
    pub fn close(&mut self, mark_completed: bool) -> bool {
        self.is_open = false;
        self.bump();
        mark_completed
    }

    /// Mask click or explicit dismiss: completed only when already on the last step.
    pub fn dismiss(&mut self) -> bool {
        let completed = self.is_last_step();
        self.close(completed)
    }

    /// First half of a restart: hide the overlay and invalidate pending work.
    /// The index goes back to 0 only once the page has been reset.
    pub fn begin_restart(&mut self) {
        self.is_open = false;
        self.bump();
    }

    /// The catalog is rebuilt per instantiation; keep the index inside it.
    pub fn set_step_count(&mut self, step_count: usize) {
        self.step_count = step_count;
        if self.current_step_index >= step_count {
            self.current_step_index = self.last_index();
        }
    }
}
