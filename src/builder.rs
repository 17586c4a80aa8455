//! Turns raw user input into a validated [`JobSpec`].

use crate::error::ValidationError;
use crate::model::{
    Complexity, JobSpec, DEFAULT_WORLD_SIZE, MAX_WORLD_SIZE, MIN_WORLD_SIZE, WORLD_SIZE_STEP,
};

/// Generation parameters exactly as the user supplied them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub prompt: String,
    pub world_size: u32,
    pub complexity: Complexity,
    pub style: Option<String>,
    pub include_terrain: bool,
    pub include_structures: bool,
    pub include_objects: bool,
}

impl Default for JobRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            world_size: DEFAULT_WORLD_SIZE,
            complexity: Complexity::Medium,
            style: None,
            include_terrain: true,
            include_structures: true,
            include_objects: true,
        }
    }
}

/// Clamp a world size into the supported range and snap it to the nearest step.
pub fn quantize_world_size(size: u32) -> u32 {
    let clamped = size.clamp(MIN_WORLD_SIZE, MAX_WORLD_SIZE);
    let snapped = (clamped + WORLD_SIZE_STEP / 2) / WORLD_SIZE_STEP * WORLD_SIZE_STEP;
    snapped.clamp(MIN_WORLD_SIZE, MAX_WORLD_SIZE)
}

/// Validate a request and package it for submission.
pub fn build_spec(request: &JobRequest) -> Result<JobSpec, ValidationError> {
    let prompt = request.prompt.trim();
    if prompt.is_empty() {
        return Err(ValidationError::empty_prompt());
    }

    let style = request
        .style
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(JobSpec {
        prompt: prompt.to_string(),
        world_size: quantize_world_size(request.world_size),
        complexity: request.complexity,
        style,
        include_terrain: request.include_terrain,
        include_structures: request.include_structures,
        include_objects: request.include_objects,
    })
}
