use crate::model::{
    Control, OutputLine, RunState, Tab, UiEvent, ValidationForm, ValidationResult,
};
use crate::notify::Toasts;
use std::collections::HashSet;
use std::path::PathBuf;

/// Terminals narrower than this collapse the sidebar.
pub const NARROW_WIDTH: u16 = 100;
const MAX_OUTPUT_LINES: usize = 5000;
/// Status-bar text shown while a results refresh is in flight.
pub const REFRESHING: &str = "Refreshing...";

/// Editable fields of the validation form, in focus order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Scenario,
    Ip,
    Port,
    Timeout,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::Scenario,
        FormField::Ip,
        FormField::Port,
        FormField::Timeout,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Scenario => "Scenario",
            FormField::Ip => "Device IP",
            FormField::Port => "Port",
            FormField::Timeout => "Timeout (s)",
        }
    }

    /// Wire name, used for inline validation.
    pub fn key(self) -> &'static str {
        match self {
            FormField::Scenario => "scenario_id",
            FormField::Ip => "ip_address",
            FormField::Port => "port",
            FormField::Timeout => "timeout",
        }
    }

    pub fn next(self) -> Self {
        let i = FormField::ALL.iter().position(|f| *f == self).unwrap_or(0);
        FormField::ALL[(i + 1) % FormField::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let i = FormField::ALL.iter().position(|f| *f == self).unwrap_or(0);
        FormField::ALL[(i + FormField::ALL.len() - 1) % FormField::ALL.len()]
    }

    pub fn value(self, form: &ValidationForm) -> &str {
        match self {
            FormField::Scenario => &form.scenario_id,
            FormField::Ip => &form.ip_address,
            FormField::Port => &form.port,
            FormField::Timeout => &form.timeout,
        }
    }

    pub fn value_mut(self, form: &mut ValidationForm) -> &mut String {
        match self {
            FormField::Scenario => &mut form.scenario_id,
            FormField::Ip => &mut form.ip_address,
            FormField::Port => &mut form.port,
            FormField::Timeout => &mut form.timeout,
        }
    }
}

pub struct UiState {
    pub tab: Tab,
    pub sidebar_open: bool,
    pub narrow: bool,
    pub info: String,
    pub server: String,

    pub form: ValidationForm,
    pub focus: FormField,

    pub run_state: RunState,
    pub progress: f64,
    pub status: String,
    pub output: Vec<OutputLine>,
    pub output_scroll: usize, // Lines scrolled up from the bottom
    pub loading: HashSet<Control>,
    pub toasts: Toasts,

    pub results: Vec<ValidationResult>,
    pub results_loaded: bool,
    pub results_selected: usize,
    pub results_scroll_offset: usize,
    pub detail: Option<ValidationResult>,
    pub detail_scroll: usize,

    pub batch_path: String,
    pub last_saved_path: Option<PathBuf>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: Tab::Validation,
            sidebar_open: true,
            narrow: false,
            info: String::new(),
            server: String::new(),
            form: ValidationForm::default(),
            focus: FormField::Scenario,
            run_state: RunState::Idle,
            progress: 0.0,
            status: String::new(),
            output: Vec::new(),
            output_scroll: 0,
            loading: HashSet::new(),
            toasts: Toasts::default(),
            results: Vec::new(),
            results_loaded: false,
            results_selected: 0,
            results_scroll_offset: 0,
            detail: None,
            detail_scroll: 0,
            batch_path: String::new(),
            last_saved_path: None,
        }
    }
}

impl UiState {
    pub fn is_loading(&self, control: Control) -> bool {
        self.loading.contains(&control)
    }

    /// Track terminal width. Crossing the breakpoint collapses or restores the sidebar.
    pub fn set_width(&mut self, width: u16) {
        let narrow = width < NARROW_WIDTH;
        if narrow != self.narrow {
            self.narrow = narrow;
            self.sidebar_open = !narrow;
        }
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    /// Returns true when the results list should be fetched.
    pub fn switch_tab(&mut self, tab: Tab) -> bool {
        let entering_results = tab == Tab::Results && self.tab != Tab::Results;
        self.tab = tab;
        if self.narrow {
            self.sidebar_open = false;
        }
        if tab != Tab::Results {
            self.detail = None;
        }
        entering_results
    }

    pub fn selected_result(&self) -> Option<&ValidationResult> {
        self.results.get(self.results_selected)
    }

    /// Move the results selection, keeping it inside the list.
    pub fn select_result(&mut self, delta: isize) {
        if self.results.is_empty() {
            self.results_selected = 0;
            return;
        }
        let last = self.results.len() - 1;
        self.results_selected = self.results_selected.saturating_add_signed(delta).min(last);
    }

    pub fn scroll_output(&mut self, delta: isize) {
        let max = self.output.len().saturating_sub(1);
        self.output_scroll = self.output_scroll.saturating_add_signed(delta).min(max);
    }

    fn push_output(&mut self, line: OutputLine) {
        self.output.push(line);
        if self.output.len() > MAX_OUTPUT_LINES {
            let drop_n = self.output.len() - MAX_OUTPUT_LINES;
            self.output.drain(0..drop_n);
        }
        // Keep the view pinned while the user is reading older lines.
        if self.output_scroll > 0 {
            self.output_scroll += 1;
        }
    }
}

/// Fold one controller event into the screen state.
pub fn apply_event(state: &mut UiState, ev: UiEvent) {
    match ev {
        UiEvent::RunState(s) => {
            state.run_state = s;
            if s == RunState::Running {
                state.output_scroll = 0;
            }
        }
        UiEvent::RunRejected(reason) => {
            state.info = reason;
        }
        UiEvent::Progress(p) => state.progress = p,
        UiEvent::StatusText(s) => state.status = s,
        UiEvent::OutputAppended(line) => state.push_output(line),
        UiEvent::OutputCleared => {
            state.output.clear();
            state.output_scroll = 0;
        }
        UiEvent::Notify(n) => state.toasts.push(n),
        UiEvent::DismissNotification(id) => {
            state.toasts.dismiss(id);
        }
        UiEvent::SwitchTab(tab) => {
            state.switch_tab(tab);
        }
        UiEvent::Results(results) => {
            if state.info == REFRESHING {
                state.info.clear();
            }
            state.results = results;
            state.results_loaded = true;
            if state.results_selected >= state.results.len() {
                state.results_selected = state.results.len().saturating_sub(1);
            }
            if state.results_scroll_offset >= state.results.len() {
                state.results_scroll_offset = 0;
            }
        }
        UiEvent::ResultDetail(r) => {
            state.switch_tab(Tab::Results);
            state.detail = Some(*r);
            state.detail_scroll = 0;
        }
        UiEvent::Loading { control, loading } => {
            if loading {
                state.loading.insert(control);
            } else {
                state.loading.remove(&control);
            }
        }
        UiEvent::FileSaved(path) => {
            state.info = format!("Saved: {} (press 'y' to copy path)", path.display());
            state.last_saved_path = Some(path);
        }
    }
}
