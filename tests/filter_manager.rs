use std::io::Write;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use chrono::NaiveDate;
use logsift::app::{FilterManager, FilterManagerHandle, FilterSpec, Notification};
use logsift::display::DisplaySnapshot;
use logsift::filter::{Direction, FilterMode};
use logsift::{Config, SiftError};

const TIMEOUT_MS: u64 = 2000;

struct Fixture {
    handle: FilterManagerHandle,
    notifications: mpsc::UnboundedReceiver<Notification>,
    task: JoinHandle<logsift::Result<()>>,
    file: NamedTempFile,
}

fn start(contents: &str, height: usize, follow: bool, filters: Vec<FilterSpec>) -> Fixture {
    let file = NamedTempFile::new().expect("create temp file");
    std::fs::write(file.path(), contents).expect("write contents");

    let mut config = Config::for_file(file.path())
        .with_display_height(height)
        .with_follow(follow);
    config.poll_interval = Duration::from_millis(20);

    let (tx, notifications) = mpsc::unbounded_channel();
    let (handle, task) =
        FilterManager::spawn_with_filters(config, filters, tx).expect("spawn manager");
    Fixture {
        handle,
        notifications,
        task,
        file,
    }
}

fn append(file: &NamedTempFile, text: &str) {
    let mut writer = std::fs::OpenOptions::new()
        .append(true)
        .open(file.path())
        .expect("open for append");
    writer.write_all(text.as_bytes()).expect("append");
    writer.flush().expect("flush");
}

fn numbered(count: usize, hit_every: usize) -> String {
    (0..count)
        .map(|n| {
            if n % hit_every == hit_every - 1 {
                format!("line {n} hit\n")
            } else {
                format!("line {n}\n")
            }
        })
        .collect()
}

async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    loop {
        let notification = timeout(Duration::from_millis(TIMEOUT_MS), rx.recv())
            .await
            .expect("notification timed out")
            .expect("notification channel closed unexpectedly");
        if !matches!(notification, Notification::Progress(_)) {
            return notification;
        }
    }
}

async fn next_display(rx: &mut mpsc::UnboundedReceiver<Notification>) -> DisplaySnapshot {
    loop {
        match next_notification(rx).await {
            Notification::DisplayChanged(snapshot) => return snapshot,
            Notification::Error { message, .. } => panic!("unexpected error: {message}"),
            _ => {}
        }
    }
}

async fn next_beep(rx: &mut mpsc::UnboundedReceiver<Notification>) -> String {
    loop {
        match next_notification(rx).await {
            Notification::Error { beep: true, message } => return message,
            Notification::DisplayChanged(snapshot) => {
                panic!("expected a beep, got display {:?}", texts(&snapshot))
            }
            _ => {}
        }
    }
}

async fn wait_loaded(rx: &mut mpsc::UnboundedReceiver<Notification>) {
    while !matches!(next_notification(rx).await, Notification::EndOfInput) {}
}

/// Every display published once the queue has gone quiet
async fn settled_displays(
    rx: &mut mpsc::UnboundedReceiver<Notification>,
) -> Vec<DisplaySnapshot> {
    sleep(Duration::from_millis(300)).await;
    let mut displays = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        match notification {
            Notification::DisplayChanged(snapshot) => displays.push(snapshot),
            Notification::Error { message, .. } => panic!("unexpected error: {message}"),
            _ => {}
        }
    }
    displays
}

fn stamped(minutes: std::ops::Range<u32>) -> String {
    minutes
        .map(|m| format!("2024-09-02 10:0{m}:00 entry {m}\n"))
        .collect()
}

fn at(minute: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 2)
        .unwrap()
        .and_hms_opt(10, minute, 0)
        .unwrap()
}

fn texts(snapshot: &DisplaySnapshot) -> Vec<String> {
    snapshot
        .rows
        .iter()
        .filter(|line| line.exists())
        .map(|line| line.text().to_string())
        .collect()
}

async fn stop(fixture: Fixture) {
    fixture.handle.shutdown();
    fixture
        .task
        .await
        .expect("manager task panicked")
        .expect("manager failed");
}

#[tokio::test]
async fn initial_load_fills_viewport_from_top() {
    let mut f = start("first\nsecond\nthird\nfourth\nfifth\n", 3, false, Vec::new());
    wait_loaded(&mut f.notifications).await;
    assert_eq!(f.handle.source_length(), 5);

    f.handle.home().await.unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert_eq!(texts(&snapshot), vec!["first", "second", "third"]);
    assert_eq!(snapshot.total_length, 5);
    assert_eq!(snapshot.percentage, 60);

    stop(f).await;
}

#[tokio::test]
async fn find_match_walks_matches_in_order() {
    let filters = vec![FilterSpec::Keyword {
        key: "hit".to_string(),
        mode: FilterMode::Match,
        case_sensitive: true,
        color_index: 1,
    }];
    let mut f = start(&numbered(10, 3), 3, false, filters);
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.current_match, None);

    for expected in [2, 5, 8] {
        f.handle.find_match(Direction::Down).await.unwrap();
        let snapshot = next_display(&mut f.notifications).await;
        assert_eq!(snapshot.current_match, Some(expected));
        assert!(snapshot.rows.iter().any(|l| l.exists() && l.no == expected));
    }

    f.handle.find_match(Direction::Down).await.unwrap();
    next_beep(&mut f.notifications).await;

    f.handle.find_match(Direction::Up).await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.current_match, Some(5));

    stop(f).await;
}

#[tokio::test]
async fn match_filter_added_at_runtime_rerenders() {
    let mut f = start(
        "INFO start\nERROR disk\nINFO tick\nERROR net\nINFO stop\n",
        4,
        false,
        Vec::new(),
    );
    wait_loaded(&mut f.notifications).await;

    f.handle
        .add_keyword_filter("ERROR", FilterMode::Match, true, 2)
        .await
        .unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert_eq!(texts(&snapshot), vec!["ERROR disk", "ERROR net"]);
    assert!(snapshot.rows[0].color_index[..5].iter().all(|slot| *slot == 2));

    stop(f).await;
}

#[tokio::test]
async fn filter_attribute_updates_apply_to_existing_filter() {
    let mut f = start("Alpha\nbeta\nalpha\n", 3, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let id = f
        .handle
        .add_keyword_filter("alpha", FilterMode::Match, true, 1)
        .await
        .unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["alpha"]);

    f.handle.set_case_sensitive(id, false).await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["Alpha", "alpha"]
    );

    f.handle.set_filter_mode(id, FilterMode::Hide).await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["beta"]);

    f.handle.set_filter_key(id, "beta").await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["Alpha", "alpha"]
    );

    stop(f).await;
}

#[tokio::test]
async fn invalid_pattern_beeps_and_keeps_running() {
    let mut f = start("one\ntwo\n", 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle
        .add_keyword_filter("(", FilterMode::Match, true, 1)
        .await
        .unwrap();
    let message = next_beep(&mut f.notifications).await;
    assert!(message.contains("Invalid pattern"));

    f.handle.home().await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["one", "two"]);

    stop(f).await;
}

#[tokio::test]
async fn removing_below_the_floor_beeps() {
    let mut f = start("one\ntwo\n", 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let id = f
        .handle
        .add_keyword_filter("one", FilterMode::Match, true, 1)
        .await
        .unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["one"]);

    f.handle.remove_filter(id).await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["one", "two"]);

    f.handle.remove_filter(id).await.unwrap();
    let message = next_beep(&mut f.notifications).await;
    assert_eq!(message, SiftError::NotEnoughFilters { minimum: 2 }.to_string());

    stop(f).await;
}

#[tokio::test]
async fn page_down_moves_partially_then_beeps() {
    let mut f = start(&numbered(5, 100), 3, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    next_display(&mut f.notifications).await;

    f.handle.page_down().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 2", "line 3", "line 4"]
    );

    f.handle.page_down().await.unwrap();
    next_beep(&mut f.notifications).await;

    f.handle.page_up().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 0", "line 1", "line 2"]
    );

    stop(f).await;
}

#[tokio::test]
async fn follow_mode_keeps_viewport_at_end() {
    let mut f = start(&numbered(3, 100), 3, true, Vec::new());
    wait_loaded(&mut f.notifications).await;

    append(&f.file, "line 3\nline 4\n");

    loop {
        let snapshot = next_display(&mut f.notifications).await;
        if texts(&snapshot) == vec!["line 2", "line 3", "line 4"] {
            assert_eq!(snapshot.total_length, 5);
            break;
        }
    }

    stop(f).await;
}

#[tokio::test]
async fn toggling_follow_starts_and_stops_tailing() {
    let mut f = start(&numbered(4, 100), 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle.toggle_follow_mode().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 2", "line 3"]
    );

    append(&f.file, "line 4\n");
    loop {
        if texts(&next_display(&mut f.notifications).await) == vec!["line 3", "line 4"] {
            break;
        }
    }

    // at the end, so this turns follow mode off
    f.handle.toggle_follow_mode().await.unwrap();
    f.handle.home().await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.total_length, 5);

    append(&f.file, "line 5\n");
    sleep(Duration::from_millis(300)).await;

    f.handle.home().await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.total_length, 5);

    stop(f).await;
}

#[tokio::test]
async fn date_range_installed_before_load_uses_loaded_lines() {
    let contents = stamped(0..6);
    let filters = vec![FilterSpec::DateRange {
        start: Some(at(2)),
        end: Some(at(5)),
    }];
    let mut f = start(&contents, 5, false, filters);
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert_eq!(
        texts(&snapshot),
        vec![
            "2024-09-02 10:02:00 entry 2",
            "2024-09-02 10:03:00 entry 3",
            "2024-09-02 10:04:00 entry 4",
        ]
    );

    stop(f).await;
}

#[tokio::test]
async fn date_range_can_be_rebounded() {
    let mut f = start(&stamped(0..6), 6, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let id = f.handle.add_date_filter(None, None).await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await).len(), 6);

    f.handle
        .set_date_range(id, Some(at(2)), Some(at(5)))
        .await
        .unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec![
            "2024-09-02 10:02:00 entry 2",
            "2024-09-02 10:03:00 entry 3",
            "2024-09-02 10:04:00 entry 4",
        ]
    );

    // ends before the first line, so nothing is left
    f.handle.set_date_range(id, None, Some(at(0))).await.unwrap();
    assert!(texts(&next_display(&mut f.notifications).await).is_empty());

    f.handle.set_date_range(id, None, None).await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await).len(), 6);

    stop(f).await;
}

#[tokio::test]
async fn date_range_beyond_loaded_data_shows_nothing() {
    let filters = vec![FilterSpec::DateRange {
        start: Some(at(7)),
        end: Some(at(9)),
    }];
    let mut f = start(&stamped(0..4), 4, false, filters);
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    assert!(texts(&next_display(&mut f.notifications).await).is_empty());

    stop(f).await;
}

#[tokio::test]
async fn horizontal_scroll_is_bounded_by_widest_line() {
    let mut f = start("short\nabcdefghij\n", 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;
    assert_eq!(f.handle.size(), 10);

    f.handle.scroll_horizontal(4).await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.current_col, 4);

    f.handle.scroll_horizontal(100).await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.current_col, 9);

    f.handle.scroll_horizontal(1).await.unwrap();
    next_beep(&mut f.notifications).await;

    f.handle.scroll_horizontal(-20).await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.current_col, 0);

    f.handle.scroll_horizontal(-1).await.unwrap();
    next_beep(&mut f.notifications).await;

    stop(f).await;
}

#[tokio::test]
async fn set_current_line_moves_the_anchor() {
    let mut f = start(&numbered(10, 100), 3, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle.set_current_line(6).await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 6", "line 7", "line 8"]
    );

    f.handle.set_current_line(10).await.unwrap();
    next_beep(&mut f.notifications).await;

    // the anchor is unchanged after the rejected jump
    f.handle.scroll_down().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 7", "line 8", "line 9"]
    );

    stop(f).await;
}

#[tokio::test]
async fn set_display_height_resizes_the_window() {
    let mut f = start(&numbered(5, 100), 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    assert_eq!(next_display(&mut f.notifications).await.rows.len(), 2);

    f.handle.set_display_height(4).await.unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert_eq!(snapshot.rows.len(), 4);
    assert_eq!(texts(&snapshot), vec!["line 0", "line 1", "line 2", "line 3"]);

    f.handle.set_display_height(1).await.unwrap();
    assert_eq!(texts(&next_display(&mut f.notifications).await), vec!["line 0"]);

    stop(f).await;
}

#[tokio::test]
async fn set_filter_color_recolors_matches() {
    let mut f = start("INFO start\nERROR disk\n", 2, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let id = f
        .handle
        .add_keyword_filter("ERROR", FilterMode::Match, true, 2)
        .await
        .unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert!(snapshot.rows[0].color_index[..5].iter().all(|slot| *slot == 2));

    f.handle.set_filter_color(id, 5).await.unwrap();
    let snapshot = next_display(&mut f.notifications).await;
    assert_eq!(texts(&snapshot), vec!["ERROR disk"]);
    assert!(snapshot.rows[0].color_index[..5].iter().all(|slot| *slot == 5));
    assert!(snapshot.rows[0].color_index[5..].iter().all(|slot| *slot != 5));

    stop(f).await;
}

#[tokio::test]
async fn toggling_follow_away_from_end_jumps_and_keeps_following() {
    let mut f = start(&numbered(6, 100), 2, true, Vec::new());
    wait_loaded(&mut f.notifications).await;

    f.handle.home().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 0", "line 1"]
    );

    f.handle.toggle_follow_mode().await.unwrap();
    assert_eq!(
        texts(&next_display(&mut f.notifications).await),
        vec!["line 4", "line 5"]
    );

    append(&f.file, "line 6\n");
    loop {
        if texts(&next_display(&mut f.notifications).await) == vec!["line 5", "line 6"] {
            break;
        }
    }

    stop(f).await;
}

#[tokio::test]
async fn back_to_back_reconfiguration_settles_on_the_last() {
    let mut f = start("alpha\nbeta\ngamma\n", 3, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let id = f
        .handle
        .add_keyword_filter("alpha", FilterMode::Match, true, 1)
        .await
        .unwrap();
    for key in ["beta", "alpha", "gamma"] {
        f.handle.set_filter_key(id, key).await.unwrap();
    }

    let displays = settled_displays(&mut f.notifications).await;
    let last = displays.last().expect("at least one display");
    assert_eq!(texts(last), vec!["gamma"]);

    stop(f).await;
}

#[tokio::test]
async fn missing_file_is_fatal_at_spawn() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = FilterManager::spawn(Config::for_file("/no/such/dir/app.log"), tx);
    assert!(matches!(result, Err(SiftError::FileError { .. })));
}

#[tokio::test]
async fn dropping_every_handle_stops_the_manager() {
    let mut f = start("only\n", 1, false, Vec::new());
    wait_loaded(&mut f.notifications).await;

    let Fixture { handle, task, .. } = f;
    drop(handle);
    timeout(Duration::from_millis(TIMEOUT_MS), task)
        .await
        .expect("manager did not stop")
        .unwrap()
        .unwrap();
}
