use serde::Serialize;

use crate::{
    config::WizardConfig,
    models::{Category, MockupId, WizardStep},
    wizard::{WizardState, MAX_SELECTED_THUMBNAILS},
};

const BUSY_MESSAGE: &str = "Hold on, fetching designs...";

/// Everything the page needs to draw the wizard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub step: WizardStep,
    pub step_number: u8,
    pub main: MainView,
    /// Drawn on top of `main` while mockups are being generated.
    pub generating_overlay: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MainView {
    Loading { message: String },
    Error { message: String },
    CategorySelect { categories: Vec<Category>, selected: Option<Category> },
    Upload { category: String, designs: Vec<DesignTile> },
    ThumbnailSelect {
        category: String,
        designs: Vec<DesignTile>,
        thumbnails: Vec<ThumbnailTile>,
        selected_count: usize,
        max_selected: usize,
        can_generate: bool,
    },
    Results { mockups: Vec<MockupTile> },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DesignTile {
    pub file_name: String,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailTile {
    pub id: String,
    pub url: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MockupTile {
    pub id: MockupId,
    pub template_name: String,
    pub design_name: String,
    pub image_url: String,
}

/// Busy beats error, error beats the step's own content.
pub fn render(state: &WizardState, config: &WizardConfig) -> Screen {
    let main = if state.is_busy() {
        MainView::Loading { message: BUSY_MESSAGE.to_string() }
    } else if let Some(message) = state.error() {
        MainView::Error { message: message.to_string() }
    } else {
        step_view(state, config)
    };
    Screen {
        step: state.step(),
        step_number: state.step().number(),
        main,
        generating_overlay: state.is_generating(),
    }
}

fn step_view(state: &WizardState, config: &WizardConfig) -> MainView {
    let category = state.category().map(Category::to_string).unwrap_or_default();
    let designs = || {
        state.designs()
            .iter()
            .map(|d| DesignTile { file_name: d.file_name.clone(), preview: d.preview_data_uri.clone() })
            .collect::<Vec<_>>()
    };

    match state.step() {
        WizardStep::CategorySelect => MainView::CategorySelect {
            categories: Category::ALL.to_vec(),
            selected: state.category().cloned(),
        },
        WizardStep::Upload => MainView::Upload { category, designs: designs() },
        WizardStep::ThumbnailSelect => MainView::ThumbnailSelect {
            thumbnails: state.thumbnails()
                .iter()
                .map(|t| ThumbnailTile {
                    id: t.clone(),
                    url: config.thumbnail_url(&category, t),
                    selected: state.is_selected(t),
                })
                .collect(),
            designs: designs(),
            selected_count: state.selected().len(),
            max_selected: MAX_SELECTED_THUMBNAILS,
            can_generate: state.can_generate(),
            category,
        },
        WizardStep::Results => MainView::Results {
            mockups: state.mockups()
                .iter()
                .map(|m| MockupTile {
                    id: m.id.clone(),
                    template_name: m.template_name.clone(),
                    design_name: m.design_name.clone(),
                    image_url: config.mockup_image_url(&m.mockup_key),
                })
                .collect(),
        },
    }
}
