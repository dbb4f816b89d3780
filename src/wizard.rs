//! Session state of the mockup wizard and the transitions that are allowed to change it.
//!
//! Every async transition hands out a [`Ticket`] when it starts and must present it again when
//! its result arrives. Results carrying a ticket that has since been superseded are dropped
//! without touching the state, so a slow response for an old category can never overwrite the
//! data of the current one.

use std::fmt::Display;

use thiserror::Error;

use crate::models::{Category, GenerateMockupsRequest, GeneratedMockup, UploadedDesign, WizardStep};

pub const MAX_SELECTED_THUMBNAILS: usize = 10;

pub type Ticket = u64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("cannot {action} during the {step:?} step")]
    NotAvailable { action: &'static str, step: WizardStep },
    #[error("no files were provided")]
    NoFiles,
    #[error("select at least one template and upload at least one design first")]
    NothingToGenerate,
    #[error("mockups are already being generated")]
    AlreadyGenerating,
    #[error("wait for the current fetch or upload to finish")]
    Busy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Pending {
    fetch: Option<Ticket>,
    upload: Option<Ticket>,
    generation: Option<Ticket>,
}

#[derive(Debug, Clone)]
pub struct WizardState {
    step: WizardStep,
    category: Option<Category>,
    thumbnails: Vec<String>,
    selected: Vec<String>,
    designs: Vec<UploadedDesign>,
    mockups: Vec<GeneratedMockup>,
    error: Option<String>,
    pending: Pending,
    last_ticket: Ticket,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            step: WizardStep::CategorySelect,
            category: None,
            thumbnails: Vec::new(),
            selected: Vec::new(),
            designs: Vec::new(),
            mockups: Vec::new(),
            error: None,
            pending: Pending::default(),
            last_ticket: 0,
        }
    }
}

impl WizardState {
    pub fn step(&self) -> WizardStep { self.step }
    pub fn category(&self) -> Option<&Category> { self.category.as_ref() }
    pub fn thumbnails(&self) -> &[String] { &self.thumbnails }
    pub fn selected(&self) -> &[String] { &self.selected }
    pub fn designs(&self) -> &[UploadedDesign] { &self.designs }
    pub fn mockups(&self) -> &[GeneratedMockup] { &self.mockups }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }

    /// Thumbnail fetch or design upload in flight.
    pub fn is_busy(&self) -> bool { self.pending.fetch.is_some() || self.pending.upload.is_some() }
    pub fn is_generating(&self) -> bool { self.pending.generation.is_some() }

    pub fn is_selected(&self, thumbnail: &str) -> bool { self.selected.iter().any(|t| t == thumbnail) }

    pub fn can_generate(&self) -> bool {
        self.step == WizardStep::ThumbnailSelect
            && !self.selected.is_empty()
            && !self.designs.is_empty()
            && !self.is_generating()
            && !self.is_busy()
    }

    fn issue_ticket(&mut self) -> Ticket {
        self.last_ticket += 1;
        self.last_ticket
    }

    /// Starts over from the upload step for `category` and returns the ticket of the thumbnail
    /// fetch that has to follow. A pending generation is abandoned since it targets the previous
    /// category; a pending upload stays valid.
    pub fn select_category(&mut self, category: Category) -> Ticket {
        let ticket = self.issue_ticket();
        self.category = Some(category);
        self.selected.clear();
        self.thumbnails.clear();
        self.mockups.clear();
        self.error = None;
        self.step = WizardStep::Upload;
        self.pending.fetch = Some(ticket);
        self.pending.generation = None;
        ticket
    }

    /// Applies a thumbnail fetch result. Returns `false` when the ticket is stale.
    pub fn thumbnails_loaded<E: Display>(&mut self, ticket: Ticket, result: Result<Vec<String>, E>) -> bool {
        if self.pending.fetch != Some(ticket) {
            return false;
        }
        self.pending.fetch = None;
        match result {
            Ok(thumbnails) => {
                self.thumbnails = thumbnails;
                self.error = None;
            }
            Err(e) => {
                self.thumbnails.clear();
                self.error = Some(format!("Failed to fetch thumbnails: {}", e));
            }
        }
        true
    }

    /// Selects or deselects a thumbnail. Returns whether the selection changed.
    ///
    /// Deselecting always works; selecting needs the identifier to be on offer and a free slot.
    pub fn toggle_thumbnail(&mut self, thumbnail: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|t| t == thumbnail) {
            self.selected.remove(pos);
            return true;
        }
        if self.selected.len() >= MAX_SELECTED_THUMBNAILS || !self.thumbnails.iter().any(|t| t == thumbnail) {
            return false;
        }
        self.selected.push(thumbnail.to_string());
        true
    }

    pub fn begin_upload(&mut self, file_count: usize) -> Result<Ticket, WizardError> {
        if !matches!(self.step, WizardStep::Upload | WizardStep::ThumbnailSelect) {
            return Err(WizardError::NotAvailable { action: "upload designs", step: self.step });
        }
        if self.is_generating() {
            return Err(WizardError::AlreadyGenerating);
        }
        if file_count == 0 {
            return Err(WizardError::NoFiles);
        }
        let ticket = self.issue_ticket();
        self.pending.upload = Some(ticket);
        Ok(ticket)
    }

    /// Applies the outcome of a whole upload batch. A failed batch leaves the previous designs
    /// and the current step untouched.
    pub fn upload_finished<E: Display>(&mut self, ticket: Ticket, result: Result<Vec<UploadedDesign>, E>) -> bool {
        if self.pending.upload != Some(ticket) {
            return false;
        }
        self.pending.upload = None;
        match result {
            Ok(designs) => {
                self.designs = designs;
                self.error = None;
                self.step = WizardStep::ThumbnailSelect;
            }
            Err(e) => {
                self.error = Some(format!("Failed to process designs: {}", e));
            }
        }
        true
    }

    /// Checks the generation guard and builds the request for the generation service.
    pub fn begin_generation(&mut self) -> Result<(Ticket, GenerateMockupsRequest), WizardError> {
        if self.is_generating() {
            return Err(WizardError::AlreadyGenerating);
        }
        if self.is_busy() {
            return Err(WizardError::Busy);
        }
        let category = match (&self.category, self.step) {
            (Some(category), WizardStep::ThumbnailSelect) => category.clone(),
            _ => return Err(WizardError::NotAvailable { action: "generate mockups", step: self.step }),
        };
        if self.selected.is_empty() || self.designs.is_empty() {
            return Err(WizardError::NothingToGenerate);
        }

        let ticket = self.issue_ticket();
        self.pending.generation = Some(ticket);
        let request = GenerateMockupsRequest {
            templates: self.selected.clone(),
            designs: self.designs.iter().map(|d| d.storage_key.clone()).collect(),
            category,
        };
        Ok((ticket, request))
    }

    pub fn generation_finished<E: Display>(&mut self, ticket: Ticket, result: Result<Vec<GeneratedMockup>, E>) -> bool {
        if self.pending.generation != Some(ticket) {
            return false;
        }
        self.pending.generation = None;
        match result {
            Ok(mockups) => {
                self.mockups = mockups;
                self.error = None;
                self.step = WizardStep::Results;
            }
            Err(e) => {
                self.error = Some(format!("Failed to generate mockups: {}", e));
            }
        }
        true
    }
}

#[cfg(test)]
pub(crate) fn design(name: &str) -> UploadedDesign {
    UploadedDesign {
        file_name: name.to_string(),
        storage_key: name.to_string(),
        preview_data_uri: format!("data:image/png;base64,{name}"),
    }
}
