use std::sync::mpsc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use versetype::content::RangeSelector;
use versetype::corpus::Corpus;
use versetype::engine::{EngineOptions, TypingEngine};
use versetype::log_store::{SqliteLogStore, VerseLogRecord, VerseLogSink};
use versetype::runtime::{FixedTicker, Runner, TestEventSource, TypingEvent};
use versetype::session::{SessionOptions, SessionPhase};
use versetype::typing_policy::policy_for;

const SMALL_CORPUS: &str = r#"{
    "name": "test",
    "books": [{
        "id": 1,
        "name": "시험",
        "abbreviation": "시",
        "chapters": [
            { "number": 1, "verses": ["가", "나", "다"] },
            { "number": 2, "verses": ["라", "마"] }
        ]
    }]
}"#;

fn options() -> EngineOptions {
    EngineOptions {
        session: SessionOptions {
            advance_debounce: Duration::ZERO,
        },
        auto_advance: true,
    }
}

fn key(c: char) -> TypingEvent {
    TypingEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
}

fn drive<S: VerseLogSink>(
    engine: &mut TypingEngine<Corpus, S>,
    runner: &Runner<TestEventSource, FixedTicker>,
    max_steps: u32,
) {
    for _ in 0..max_steps {
        let now = Instant::now();
        match runner.step() {
            TypingEvent::Tick => {
                engine.tick(now);
            }
            TypingEvent::Resize => {}
            TypingEvent::Paste(text) => {
                engine.paste(&text, now).unwrap();
            }
            TypingEvent::Key(key) => match key.code {
                KeyCode::Char(c) => {
                    engine.type_char(c, now).unwrap();
                }
                KeyCode::Backspace => {
                    engine.backspace(now).unwrap();
                }
                KeyCode::Enter => {
                    engine.confirm(now).unwrap();
                }
                _ => {}
            },
        }
        if engine.is_complete() {
            break;
        }
    }
}

// Types a two-chapter range through Runner/TestEventSource, crossing a page
// and a chapter boundary on the way.
#[test]
fn headless_range_crosses_pages_and_chapters() {
    let corpus = Corpus::from_json(SMALL_CORPUS).unwrap().with_page_size(2);
    let mut engine = TypingEngine::new(corpus, Vec::<VerseLogRecord>::new(), policy_for(false), options());
    engine.open(RangeSelector::new(1, 1, 2)).unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(5)));

    for c in ['가', '나', '다'] {
        tx.send(key(c)).unwrap();
    }
    drive(&mut engine, &runner, 10);
    assert_eq!(engine.session().cursor().chapter, 2);
    assert_eq!(engine.session().active_unit().unwrap().label, "시 2:1");

    tx.send(key('라')).unwrap();
    tx.send(key('마')).unwrap();
    drive(&mut engine, &runner, 100);

    assert!(engine.is_complete());
    assert_eq!(engine.session().phase(), SessionPhase::SessionComplete);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.total_typed, 5);
    assert_eq!(snapshot.accuracy(), 100.0);

    let ids: Vec<u64> = engine.sink().iter().map(|r| r.unit_id).collect();
    assert_eq!(ids, vec![1_001_001, 1_001_002, 1_001_003, 1_002_001, 1_002_002]);
}

#[test]
fn headless_paste_and_backspace() {
    let corpus = Corpus::bundled().unwrap().with_page_size(3);
    let mut engine = TypingEngine::new(corpus, Vec::<VerseLogRecord>::new(), policy_for(false), options());
    engine.open(RangeSelector::new(1, 1, 1)).unwrap();

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(5)));

    tx.send(TypingEvent::Paste("태초에".to_string())).unwrap();
    tx.send(key('X')).unwrap();
    tx.send(TypingEvent::Key(KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE)))
        .unwrap();
    drive(&mut engine, &runner, 3);

    assert_eq!(engine.session().active_input(), "태초에");
    let unit_id = engine.session().active_unit().unwrap().id;
    // The paste is not a keystroke; the typo and its deletion are.
    assert_eq!(engine.events().events(unit_id).len(), 2);
    assert_eq!(engine.events().backspace_count(unit_id), 1);
    assert_eq!(engine.events().error_count(unit_id), 1);
}

#[test]
fn headless_ticks_keep_clock_running() {
    let corpus = Corpus::from_json(SMALL_CORPUS).unwrap();
    let mut engine = TypingEngine::new(corpus, Vec::<VerseLogRecord>::new(), policy_for(false), options());
    engine.open(RangeSelector::new(1, 1, 1)).unwrap();

    let (_tx, rx) = mpsc::channel();
    let runner = Runner::new(TestEventSource::new(rx), FixedTicker::new(Duration::from_millis(5)));

    let start = Instant::now();
    engine.type_char('ㄱ', start).unwrap();
    for _ in 0..4 {
        if let TypingEvent::Tick = runner.step() {
            engine.tick(start + Duration::from_secs(3));
        }
    }
    assert_eq!(engine.snapshot().elapsed_ms, 3_000);
}

#[test]
fn headless_logs_land_in_sqlite() {
    let corpus = Corpus::from_json(SMALL_CORPUS).unwrap();
    let store = SqliteLogStore::open_in_memory().unwrap();
    let mut engine = TypingEngine::new(corpus, store, policy_for(false), options());
    engine.open(RangeSelector::new(1, 2, 2)).unwrap();

    let now = Instant::now();
    engine.type_char('라', now).unwrap();
    engine.type_char('마', now + Duration::from_millis(400)).unwrap();
    assert!(engine.is_complete());

    let logs = engine.sink().recent_logs(10).unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| log.session_id == engine.session_id()));
}
