use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use versetype::content::{ContentLoader, LoadError, Page, RangeSelector, TextUnit};
use versetype::corpus::Corpus;
use versetype::session::{
    Direction, LoadRequest, SessionError, SessionOptions, SessionPhase, SessionSeed, Step, Transition,
    TypingSession,
};
use versetype::typing_policy::policy_for;

const TWO_CHAPTERS: &str = r#"{
    "name": "test",
    "books": [{
        "id": 7,
        "name": "시험",
        "chapters": [
            { "number": 1, "verses": ["가", "나", "다", "라"] },
            { "number": 2, "verses": ["마", "바"] }
        ]
    }]
}"#;

fn corpus() -> Corpus {
    Corpus::from_json(TWO_CHAPTERS).unwrap().with_page_size(2)
}

fn session(range: RangeSelector) -> TypingSession {
    TypingSession::new(
        range,
        policy_for(false),
        SessionOptions {
            advance_debounce: Duration::ZERO,
        },
    )
}

fn unit(id: u64, text: &str) -> TextUnit {
    TextUnit {
        id,
        chapter: 1,
        number: id as u32,
        label: format!("1:{id}"),
        text: text.to_string(),
    }
}

/// Runs a page load on a worker thread, the way a network-backed source would.
fn load_in_background(
    session: &TypingSession,
    step: Step,
    mut loader: Corpus,
) -> (LoadRequest, mpsc::Receiver<Result<Page, LoadError>>) {
    let Step::Load(request) = step else {
        panic!("expected a load, got {step:?}");
    };
    let range = session.range().clone();
    let cursor = session.cursor().clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        tx.send(request.run(&mut loader, &range, &cursor)).unwrap();
    });
    (request, rx)
}

#[test]
fn completing_first_of_two_units_moves_without_reload() {
    let mut session = session(RangeSelector::new(1, 1, 1));
    session.replace_units(vec![unit(1, "가"), unit(2, "나")]);

    let outcome = session.input("가").unwrap();
    assert!(outcome.just_completed);

    let mut loader = corpus();
    let transition = session.advance(&mut loader, Instant::now()).unwrap();
    assert_eq!(transition, Transition::Moved { index: 1 });
    assert_eq!(session.active_index(), Some(1));
    assert_eq!(session.phase(), SessionPhase::Active(1));
}

#[test]
fn background_load_crosses_page_then_chapter() {
    let mut loader = corpus();
    let range = RangeSelector::new(7, 1, 2);
    let mut session = session(range.clone());
    session.open(&mut loader, range).unwrap();
    let now = Instant::now();

    session.input("가");
    assert_eq!(session.advance(&mut loader, now).unwrap(), Transition::Moved { index: 1 });

    let step = session.begin_advance(now).unwrap();
    assert_eq!(session.phase(), SessionPhase::PageBoundary);
    assert!(session.input("나").is_none());

    let (request, rx) = load_in_background(&session, step, corpus());
    assert_eq!(request.direction, Direction::Forward);
    let transition = session.complete_load(request, rx.recv().unwrap()).unwrap();
    assert_eq!(
        transition,
        Transition::Loaded {
            chapter: 1,
            page: 2,
            index: 0
        }
    );
    assert_eq!(session.active_unit().unwrap().text, "다");

    session.activate(1);
    let step = session.begin_advance(now).unwrap();
    assert_eq!(session.phase(), SessionPhase::ChapterBoundary);
    let (request, rx) = load_in_background(&session, step, corpus());
    session.complete_load(request, rx.recv().unwrap()).unwrap();

    assert_eq!(session.cursor().chapter, 2);
    assert_eq!(session.active_unit().unwrap().text, "마");
}

#[test]
fn second_advance_while_loading_is_busy() {
    let mut loader = corpus();
    let range = RangeSelector::new(7, 1, 1);
    let mut session = session(range.clone());
    session.open(&mut loader, range).unwrap();
    session.activate(1);

    let step = session.begin_advance(Instant::now()).unwrap();
    assert!(matches!(step, Step::Load(_)));
    assert!(session.is_busy());
    assert_eq!(session.begin_advance(Instant::now()), Err(SessionError::Busy));
    assert_eq!(session.begin_retreat(), Err(SessionError::Busy));
}

#[test]
fn cancelled_load_result_is_discarded() {
    let mut loader = corpus();
    let range = RangeSelector::new(7, 1, 1);
    let mut session = session(range.clone());
    session.open(&mut loader, range).unwrap();
    session.activate(1);

    let step = session.begin_advance(Instant::now()).unwrap();
    let (request, rx) = load_in_background(&session, step, corpus());
    session.cancel_pending();
    assert_eq!(session.phase(), SessionPhase::Active(1));

    let transition = session.complete_load(request, rx.recv().unwrap()).unwrap();
    assert_eq!(transition, Transition::Discarded);
    assert_eq!(session.cursor().page, 1);
    assert_eq!(session.active_index(), Some(1));
}

#[test]
fn failed_load_keeps_position() {
    let range = RangeSelector::new(7, 1, 1);
    let mut session = session(range.clone());
    session.open(&mut corpus(), range).unwrap();
    session.activate(1);

    let Step::Load(request) = session.begin_advance(Instant::now()).unwrap() else {
        panic!("expected a load");
    };
    let err = session
        .complete_load(request, Err(LoadError::Unavailable("offline".to_string())))
        .unwrap_err();

    assert!(matches!(err, SessionError::Load(LoadError::Unavailable(_))));
    assert_eq!(session.phase(), SessionPhase::Active(1));
    assert_eq!(session.cursor().page, 1);
    assert!(!session.is_busy());
}

#[test]
fn retreat_from_chapter_start_loads_previous_chapter_last_page() {
    let mut loader = corpus();
    let range = RangeSelector::new(7, 1, 2);
    let mut session = session(range.clone());
    let seed = SessionSeed {
        chapter: 2,
        page: 1,
        unit_id: None,
    };
    session.resume(&mut loader, range, seed).unwrap();
    assert_eq!(session.cursor().chapter, 2);

    let transition = session.retreat(&mut loader).unwrap();
    assert_eq!(
        transition,
        Transition::Loaded {
            chapter: 1,
            page: 2,
            index: 1
        }
    );
    assert_eq!(session.active_unit().unwrap().text, "라");
}

#[test]
fn debounce_suppresses_rapid_advance() {
    let mut loader = corpus();
    let range = RangeSelector::new(7, 1, 1);
    let mut session = TypingSession::new(
        range.clone(),
        policy_for(false),
        SessionOptions {
            advance_debounce: Duration::from_millis(250),
        },
    );
    session.open(&mut loader, range).unwrap();
    let now = Instant::now();

    assert_eq!(session.advance(&mut loader, now).unwrap(), Transition::Moved { index: 1 });
    assert_eq!(
        session.advance(&mut loader, now + Duration::from_millis(100)).unwrap(),
        Transition::Debounced
    );
    assert_eq!(session.active_index(), Some(1));
}

#[test]
fn loader_range_stats_cover_every_chapter() {
    let stats = corpus().range_stats(&RangeSelector::new(7, 1, 2)).unwrap();
    assert_eq!(stats.unit_count, 6);
    assert_eq!(stats.character_count, 6);
}
