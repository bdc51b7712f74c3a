mod clipboard;
mod help;
pub mod state;
mod views;

use crate::api::ValidatorClient;
use crate::config::AppConfig;
use crate::model::{Tab, UiEvent, ValidationForm};
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use state::{apply_event, UiState, REFRESHING};
use std::path::PathBuf;
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(cfg: Arc<AppConfig>, client: ValidatorClient, form: ValidationForm) -> Result<()> {
    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let server = client.base_url().to_string();
    let ui_handle = std::thread::spawn(move || run_threaded(server, form, event_rx, cmd_tx));

    let res = orchestrator::run_controller(cfg, client, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    server: String,
    form: ValidationForm,
    mut event_rx: UnboundedReceiver<UiEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState {
        server,
        form,
        ..Default::default()
    };
    if let Ok(size) = terminal.size() {
        state.set_width(size.width);
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| views::draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => {
                    let mut quit = false;
                    for cmd in handle_key(&mut state, k) {
                        quit |= matches!(cmd, UiCommand::Quit);
                        let _ = cmd_tx.send(cmd);
                    }
                    if quit {
                        break Ok(());
                    }
                }
                Ok(Event::Resize(width, _)) => state.set_width(width),
                _ => {}
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn switch_to(state: &mut UiState, tab: Tab, out: &mut Vec<UiCommand>) {
    if state.switch_tab(tab) {
        out.push(UiCommand::RefreshResults);
    }
}

/// Translate one key press into state changes and controller commands.
fn handle_key(state: &mut UiState, k: KeyEvent) -> Vec<UiCommand> {
    let mut out = Vec::new();
    let ctrl_or_alt = k.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT);

    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (KeyModifiers::CONTROL, KeyCode::Char('q')) => {
            out.push(UiCommand::Quit);
            return out;
        }
        (KeyModifiers::CONTROL, KeyCode::Char('b')) => {
            state.toggle_sidebar();
            return out;
        }
        (KeyModifiers::CONTROL, KeyCode::Char('x')) => {
            if let Some(n) = state.toasts.newest() {
                out.push(UiCommand::DismissNotification(n.id));
            }
            return out;
        }
        (_, KeyCode::Char(c @ '1'..='3')) if ctrl_or_alt => {
            let tab = Tab::ALL[(c as u8 - b'1') as usize];
            switch_to(state, tab, &mut out);
            return out;
        }
        (_, KeyCode::F(1)) => {
            switch_to(state, Tab::Help, &mut out);
            return out;
        }
        (_, KeyCode::Tab) => {
            let next = state.tab.next();
            switch_to(state, next, &mut out);
            return out;
        }
        (_, KeyCode::BackTab) => {
            let prev = state.tab.prev();
            switch_to(state, prev, &mut out);
            return out;
        }
        (_, KeyCode::Esc) => {
            if state.narrow && state.sidebar_open {
                state.sidebar_open = false;
            } else if state.detail.is_some() {
                state.detail = None;
            } else {
                state.info.clear();
            }
            return out;
        }
        _ => {}
    }

    match state.tab {
        Tab::Validation => handle_validation_key(state, k, &mut out),
        Tab::Results => handle_results_key(state, k, &mut out),
        Tab::Batch => handle_batch_key(state, k, &mut out),
        Tab::Help => {
            if k.code == KeyCode::Char('q') {
                out.push(UiCommand::Quit);
            }
        }
    }
    out
}

fn is_text_input(k: &KeyEvent) -> Option<char> {
    match k.code {
        KeyCode::Char(c) if !k.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            Some(c)
        }
        _ => None,
    }
}

fn handle_validation_key(state: &mut UiState, k: KeyEvent, out: &mut Vec<UiCommand>) {
    match (k.modifiers, k.code) {
        (_, KeyCode::Enter) => out.push(UiCommand::StartValidation(state.form.clone())),
        (KeyModifiers::CONTROL, KeyCode::Char('p')) => out.push(UiCommand::Prevalidate {
            ip_address: state.form.ip_address.clone(),
            port: state.form.port.clone(),
        }),
        (KeyModifiers::CONTROL, KeyCode::Char('l')) => out.push(UiCommand::ClearOutput),
        (_, KeyCode::Up) => state.focus = state.focus.prev(),
        (_, KeyCode::Down) => state.focus = state.focus.next(),
        (_, KeyCode::PageUp) => state.scroll_output(10),
        (_, KeyCode::PageDown) => state.scroll_output(-10),
        (_, KeyCode::End) => state.output_scroll = 0,
        (_, KeyCode::Backspace) => {
            state.focus.value_mut(&mut state.form).pop();
        }
        _ => {
            if let Some(c) = is_text_input(&k) {
                state.focus.value_mut(&mut state.form).push(c);
            }
        }
    }
}

fn handle_results_key(state: &mut UiState, k: KeyEvent, out: &mut Vec<UiCommand>) {
    if let Some(detail) = &state.detail {
        match k.code {
            KeyCode::Up | KeyCode::Char('k') => {
                state.detail_scroll = state.detail_scroll.saturating_sub(1)
            }
            KeyCode::Down | KeyCode::Char('j') => state.detail_scroll += 1,
            KeyCode::PageUp => state.detail_scroll = state.detail_scroll.saturating_sub(10),
            KeyCode::PageDown => state.detail_scroll += 10,
            KeyCode::Char('d') => out.push(UiCommand::DownloadResult(detail.id.clone())),
            KeyCode::Backspace => state.detail = None,
            KeyCode::Char('q') => out.push(UiCommand::Quit),
            _ => {}
        }
        return;
    }

    match k.code {
        KeyCode::Up | KeyCode::Char('k') => state.select_result(-1),
        KeyCode::Down | KeyCode::Char('j') => state.select_result(1),
        KeyCode::PageUp => state.select_result(-10),
        KeyCode::PageDown => state.select_result(10),
        KeyCode::Home | KeyCode::Char('g') => state.results_selected = 0,
        KeyCode::End | KeyCode::Char('G') => state.select_result(isize::MAX),
        KeyCode::Enter | KeyCode::Char('v') => {
            if let Some(r) = state.selected_result() {
                out.push(UiCommand::ViewResult(r.id.clone()));
            }
        }
        KeyCode::Char('d') => {
            if let Some(r) = state.selected_result() {
                out.push(UiCommand::DownloadResult(r.id.clone()));
            }
        }
        KeyCode::Char('e') => out.push(UiCommand::ExportResults),
        KeyCode::Char('r') => {
            state.info = REFRESHING.into();
            out.push(UiCommand::RefreshResults);
        }
        KeyCode::Char('y') => copy_saved_path(state),
        KeyCode::Char('q') => out.push(UiCommand::Quit),
        _ => {}
    }
}

fn copy_saved_path(state: &mut UiState) {
    let Some(path) = state.last_saved_path.as_ref() else {
        state.info = "No saved file path to copy. Download or export first (d/e)".into();
        return;
    };
    let path = path.display().to_string();
    state.info = match clipboard::copy(&path) {
        Ok(()) => format!("✓ Copied to clipboard: {path}"),
        Err(e) => format!("Clipboard copy failed: {e:#}"),
    };
}

fn handle_batch_key(state: &mut UiState, k: KeyEvent, out: &mut Vec<UiCommand>) {
    match k.code {
        KeyCode::Enter => {
            let path = state.batch_path.trim();
            let file = (!path.is_empty()).then(|| PathBuf::from(path));
            out.push(UiCommand::UploadBatch(file));
        }
        KeyCode::Backspace => {
            state.batch_path.pop();
        }
        _ => {
            if let Some(c) = is_text_input(&k) {
                state.batch_path.push(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Notification, NotificationKind, ValidationResult};

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn type_text(state: &mut UiState, text: &str) {
        for c in text.chars() {
            assert!(handle_key(state, press(KeyCode::Char(c))).is_empty());
        }
    }

    #[test]
    fn typing_fills_the_focused_field_and_enter_submits_it() {
        let mut s = UiState::default();
        type_text(&mut s, "basic");
        handle_key(&mut s, press(KeyCode::Down));
        type_text(&mut s, "10.0.0.9");
        handle_key(&mut s, press(KeyCode::Down));
        type_text(&mut s, "20000q");
        handle_key(&mut s, press(KeyCode::Backspace));

        let cmds = handle_key(&mut s, press(KeyCode::Enter));
        match cmds.as_slice() {
            [UiCommand::StartValidation(form)] => {
                assert_eq!(form.scenario_id, "basic");
                assert_eq!(form.ip_address, "10.0.0.9");
                assert_eq!(form.port, "20000");
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn ctrl_shortcuts_switch_tabs_and_refresh_results() {
        let mut s = UiState::default();
        let cmds = handle_key(&mut s, ctrl('2'));
        assert_eq!(s.tab, Tab::Results);
        assert!(matches!(cmds.as_slice(), [UiCommand::RefreshResults]));
        handle_key(&mut s, KeyEvent::new(KeyCode::Char('3'), KeyModifiers::ALT));
        assert_eq!(s.tab, Tab::Batch);
        handle_key(&mut s, press(KeyCode::F(1)));
        assert_eq!(s.tab, Tab::Help);
        handle_key(&mut s, press(KeyCode::Tab));
        assert_eq!(s.tab, Tab::Validation);
    }

    #[test]
    fn q_types_into_the_form_but_quits_from_results() {
        let mut s = UiState::default();
        assert!(handle_key(&mut s, press(KeyCode::Char('q'))).is_empty());
        assert_eq!(s.form.scenario_id, "q");
        s.tab = Tab::Results;
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Char('q'))).as_slice(),
            [UiCommand::Quit]
        ));
        assert!(matches!(handle_key(&mut s, ctrl('c')).as_slice(), [UiCommand::Quit]));
    }

    #[test]
    fn esc_closes_sidebar_only_when_narrow() {
        let mut s = UiState::default();
        s.set_width(80);
        handle_key(&mut s, ctrl('b'));
        assert!(s.sidebar_open);
        handle_key(&mut s, press(KeyCode::Esc));
        assert!(!s.sidebar_open);

        let mut wide = UiState::default();
        wide.set_width(160);
        handle_key(&mut wide, press(KeyCode::Esc));
        assert!(wide.sidebar_open);
    }

    #[test]
    fn results_keys_act_on_the_selection() {
        let mut s = UiState::default();
        s.tab = Tab::Results;
        let results: Vec<ValidationResult> = serde_json::from_value(serde_json::json!([
            {"id": "r1", "status": "success"},
            {"id": "r2", "status": "failure"}
        ]))
        .unwrap();
        apply_event(&mut s, UiEvent::Results(results));

        handle_key(&mut s, press(KeyCode::Char('j')));
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Enter)).as_slice(),
            [UiCommand::ViewResult(id)] if id == "r2"
        ));
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Char('d'))).as_slice(),
            [UiCommand::DownloadResult(id)] if id == "r2"
        ));
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Char('e'))).as_slice(),
            [UiCommand::ExportResults]
        ));
    }

    #[test]
    fn empty_batch_path_uploads_nothing() {
        let mut s = UiState::default();
        s.tab = Tab::Batch;
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Enter)).as_slice(),
            [UiCommand::UploadBatch(None)]
        ));
        type_text(&mut s, "cmds.txt");
        assert!(matches!(
            handle_key(&mut s, press(KeyCode::Enter)).as_slice(),
            [UiCommand::UploadBatch(Some(p))] if p == &PathBuf::from("cmds.txt")
        ));
    }

    #[test]
    fn ctrl_x_dismisses_the_newest_notification() {
        let mut s = UiState::default();
        for id in [3, 4] {
            apply_event(
                &mut s,
                UiEvent::Notify(Notification {
                    id,
                    kind: NotificationKind::Info,
                    message: "saved".into(),
                    duration: Duration::from_secs(5),
                }),
            );
        }
        assert!(matches!(
            handle_key(&mut s, ctrl('x')).as_slice(),
            [UiCommand::DismissNotification(4)]
        ));
    }
}
