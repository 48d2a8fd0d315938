mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{DisableBracketedPaste, EnableBracketedPaste, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Frame, Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::PathBuf,
    time::Instant,
};
use tracing::{info, warn};

use versetype::{
    app_dirs::AppDirs,
    compare::VerseComparator,
    config::{Config, ConfigStore, FileConfigStore},
    content::{RangeSelector, TextUnit},
    corpus::Corpus,
    engine::{EngineOptions, TypingEngine},
    log_store::{NullSink, SqliteLogStore, VerseLogSink},
    runtime::{CrosstermEventSource, FixedTicker, Runner, TypingEvent},
    session::{SessionError, SessionOptions},
    trace_init::init_tracing,
    typing_policy::policy_for,
};

/// Hangul verse typing practice
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Type Korean scripture verse by verse with live per-jamo feedback, speed and accuracy, and a local log of every keystroke."
)]
pub struct Cli {
    /// book to type, by id, name or abbreviation
    #[clap(short = 'b', long, default_value = "1")]
    book: String,

    /// first chapter of the range
    #[clap(short = 'c', long, default_value_t = 1)]
    chapter_start: u32,

    /// last chapter of the range (defaults to the first)
    #[clap(short = 'e', long)]
    chapter_end: Option<u32>,

    /// verse to start on within the first chapter
    #[clap(short = 'v', long)]
    start_verse: Option<u32>,

    /// type this text instead of a corpus range
    #[clap(short = 't', long)]
    text: Option<String>,

    /// type this many verses drawn at random from the corpus
    #[clap(short = 'r', long)]
    random: Option<usize>,

    /// corpus json file to read instead of the bundled one
    #[clap(long)]
    corpus: Option<PathBuf>,

    /// verses per page
    #[clap(long)]
    page_size: Option<usize>,

    /// count half-composed syllables as typos instead of work in progress
    #[clap(long)]
    strict: bool,

    /// wait for enter after each verse
    #[clap(long)]
    no_auto_advance: bool,

    /// compare INPUT against --text, print the result as json and exit
    #[clap(long, value_name = "INPUT", requires = "text")]
    compare: Option<String>,

    /// write the effective settings to the config file
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    /// Flags override the stored config.
    fn merge_config(&self, mut config: Config) -> Config {
        if let Some(page_size) = self.page_size {
            config.page_size = page_size.max(1);
        }
        if self.strict {
            config.strict_boundaries = true;
        }
        if self.no_auto_advance {
            config.auto_advance = false;
        }
        if let Some(count) = self.random {
            config.random_count = count.max(1);
        }
        if self.corpus.is_some() {
            config.corpus_path = self.corpus.clone();
        }
        config
    }

    fn range(&self, corpus: &Corpus) -> Result<RangeSelector, String> {
        let book = corpus
            .find_book(&self.book)
            .ok_or_else(|| format!("unknown book '{}'", self.book))?;
        let end = self.chapter_end.unwrap_or(self.chapter_start).max(self.chapter_start);
        let range = RangeSelector::new(book.id, self.chapter_start, end);
        Ok(match self.start_verse {
            Some(verse) => range.starting_at(verse),
            None => range,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Typing,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub type Engine = TypingEngine<Corpus, Box<dyn VerseLogSink>>;

pub struct App {
    pub engine: Engine,
    pub state: AppState,
    /// Last error worth showing, cleared by the next successful action.
    pub status: Option<String>,
}

impl App {
    pub fn new(cli: &Cli, config: &Config, corpus: Corpus, sink: Box<dyn VerseLogSink>) -> Result<Self, Box<dyn Error>> {
        let options = EngineOptions {
            session: SessionOptions {
                advance_debounce: config.advance_debounce(),
            },
            auto_advance: config.auto_advance,
        };

        let units = if let Some(text) = &cli.text {
            Some(vec![TextUnit {
                id: 0,
                chapter: 0,
                number: 1,
                label: "custom".to_string(),
                text: text.clone(),
            }])
        } else if cli.random.is_some() {
            Some(corpus.random_units(config.random_count, &mut rand::thread_rng()))
        } else {
            None
        };
        let range = match units {
            Some(_) => None,
            None => Some(cli.range(&corpus)?),
        };

        let mut engine = TypingEngine::new(corpus, sink, policy_for(config.strict_boundaries), options);
        match (units, range) {
            (Some(units), _) => {
                engine.open_units(units);
            }
            (None, Some(range)) => {
                engine.open(range)?;
            }
            (None, None) => {}
        }
        info!(session_id = engine.session_id(), "app ready");

        Ok(Self {
            engine,
            state: AppState::Typing,
            status: None,
        })
    }

    fn handle(&mut self, event: TypingEvent, now: Instant) -> Flow {
        match event {
            TypingEvent::Tick => {
                self.engine.tick(now);
                self.sync_state();
            }
            TypingEvent::Resize => {}
            TypingEvent::Paste(text) => {
                if self.state == AppState::Typing {
                    let result = self.engine.paste(&text, now).map(|_| ());
                    self.settle(result);
                }
            }
            TypingEvent::Key(key) => return self.on_key(key, now),
        }
        Flow::Continue
    }

    fn on_key(&mut self, key: KeyEvent, now: Instant) -> Flow {
        if key.kind == KeyEventKind::Release {
            return Flow::Continue;
        }
        if key.code == KeyCode::Esc
            || (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
        {
            return Flow::Quit;
        }

        match self.state {
            AppState::Typing => {
                let result = match key.code {
                    KeyCode::Enter => self.engine.confirm(now).map(|_| ()),
                    KeyCode::Backspace => self.engine.backspace(now).map(|_| ()),
                    KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.engine.type_char(c, now).map(|_| ())
                    }
                    _ => Ok(()),
                };
                self.settle(result);
            }
            AppState::Complete => match key.code {
                KeyCode::Char('q') => return Flow::Quit,
                KeyCode::Char('r') => {
                    let result = self.engine.retry().map(|_| ());
                    self.settle(result);
                }
                KeyCode::Backspace => {
                    let result = self.engine.back(now).map(|_| ());
                    self.settle(result);
                }
                _ => {}
            },
        }
        Flow::Continue
    }

    fn settle(&mut self, result: Result<(), SessionError>) {
        match result {
            Ok(()) => self.status = None,
            Err(SessionError::Busy) => {}
            Err(err) => {
                warn!(error = %err, "action failed");
                self.status = Some(err.to_string());
            }
        }
        self.sync_state();
    }

    fn sync_state(&mut self) {
        self.state = if self.engine.is_complete() {
            AppState::Complete
        } else {
            AppState::Typing
        };
    }
}

fn load_corpus(config: &Config) -> Result<Corpus, Box<dyn Error>> {
    let corpus = match &config.corpus_path {
        Some(path) => Corpus::from_path(path)?,
        None => Corpus::bundled()?,
    };
    Ok(corpus.with_page_size(config.page_size))
}

fn open_sink() -> Box<dyn VerseLogSink> {
    let Some(path) = AppDirs::db_path() else {
        return Box::new(NullSink);
    };
    match SqliteLogStore::open(&path) {
        Ok(store) => Box::new(store),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "verse logs disabled");
            Box::new(NullSink)
        }
    }
}

/// Headless comparison for scripting and smoke tests.
fn compare_json(text: &str, input: &str, strict: bool) -> serde_json::Value {
    let mut comparator = VerseComparator::new(text);
    let outcome = comparator.update(input, policy_for(strict).as_ref());
    serde_json::json!({
        "target": text,
        "input": input,
        "complete": outcome.complete,
        "statuses": comparator.statuses(),
        "cells": comparator.cells(),
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let store = FileConfigStore::new();
    let config = cli.merge_config(store.load());

    if cli.save_config {
        store.save(&config)?;
    }

    if let (Some(input), Some(text)) = (&cli.compare, &cli.text) {
        println!("{}", compare_json(text, input, config.strict_boundaries));
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let _guard = AppDirs::log_dir().and_then(|dir| init_tracing(&dir));
    let corpus = load_corpus(&config)?;
    let mut app = App::new(&cli, &config, corpus, open_sink())?;

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let runner = Runner::new(CrosstermEventSource::new(), FixedTicker::new(config.tick_interval()));
    let result = start_tui(&mut terminal, &mut app, &runner);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: &Runner<CrosstermEventSource, FixedTicker>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| ui(app, f))?;
    loop {
        let event = runner.step();
        if app.handle(event, Instant::now()) == Flow::Quit {
            break;
        }
        terminal.draw(|f| ui(app, f))?;
    }
    Ok(())
}

fn ui(app: &App, f: &mut Frame) {
    f.render_widget(app, f.area());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use std::time::Duration;

    fn key(code: KeyCode) -> TypingEvent {
        TypingEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn text_app(text: &str) -> App {
        let cli = Cli::parse_from(["versetype", "--text", text]);
        let config = cli.merge_config(Config::default());
        App::new(&cli, &config, Corpus::bundled().unwrap(), Box::new(NullSink)).unwrap()
    }

    fn rendered(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| ui(app, f)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .filter(|symbol| !symbol.trim().is_empty())
            .collect()
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["versetype"]);

        assert_eq!(cli.book, "1");
        assert_eq!(cli.chapter_start, 1);
        assert_eq!(cli.chapter_end, None);
        assert_eq!(cli.start_verse, None);
        assert_eq!(cli.text, None);
        assert!(!cli.strict);
        assert!(!cli.no_auto_advance);
    }

    #[test]
    fn test_cli_range_flags() {
        let cli = Cli::parse_from(["versetype", "-b", "창", "-c", "1", "-e", "2", "-v", "5"]);
        let corpus = Corpus::bundled().unwrap();
        let range = cli.range(&corpus).unwrap();

        assert_eq!(range.book_id, 1);
        assert_eq!((range.chapter_start, range.chapter_end), (1, 2));
        assert_eq!(range.start_verse, Some(5));
    }

    #[test]
    fn test_cli_unknown_book() {
        let cli = Cli::parse_from(["versetype", "--book", "출애굽기"]);
        let corpus = Corpus::bundled().unwrap();
        assert!(cli.range(&corpus).unwrap_err().contains("출애굽기"));
    }

    #[test]
    fn test_cli_chapter_end_never_precedes_start() {
        let cli = Cli::parse_from(["versetype", "-c", "2", "-e", "1"]);
        let range = cli.range(&Corpus::bundled().unwrap()).unwrap();
        assert_eq!(range.chapter_end, 2);
    }

    #[test]
    fn test_compare_requires_text() {
        assert!(Cli::try_parse_from(["versetype", "--compare", "가"]).is_err());
        assert!(Cli::try_parse_from(["versetype", "--text", "가", "--compare", "가"]).is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "versetype",
            "--page-size",
            "3",
            "--strict",
            "--no-auto-advance",
            "--random",
            "6",
        ]);
        let config = cli.merge_config(Config::default());

        assert_eq!(config.page_size, 3);
        assert!(config.strict_boundaries);
        assert!(!config.auto_advance);
        assert_eq!(config.random_count, 6);
        assert_eq!(config.tick_interval_ms, Config::default().tick_interval_ms);
    }

    #[test]
    fn test_compare_json_reports_statuses() {
        let value = compare_json("가나", "가", false);

        assert_eq!(value["complete"], false);
        assert_eq!(value["statuses"][0], "correct");
        assert_eq!(value["cells"][0]["text"], "가");
    }

    #[test]
    fn test_app_opens_bundled_range() {
        let cli = Cli::parse_from(["versetype", "--page-size", "5"]);
        let config = cli.merge_config(Config::default());
        let app = App::new(&cli, &config, load_corpus(&config).unwrap(), Box::new(NullSink)).unwrap();

        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.engine.session().units().len(), 5);
        assert_eq!(app.engine.session().active_unit().unwrap().label, "창 1:1");
    }

    #[test]
    fn test_app_random_units() {
        let cli = Cli::parse_from(["versetype", "--random", "3"]);
        let config = cli.merge_config(Config::default());
        let app = App::new(&cli, &config, Corpus::bundled().unwrap(), Box::new(NullSink)).unwrap();

        assert_eq!(app.engine.session().units().len(), 3);
    }

    #[test]
    fn test_typing_to_completion_and_retry() {
        let mut app = text_app("가나");
        let now = Instant::now();

        assert_eq!(app.handle(key(KeyCode::Char('가')), now), Flow::Continue);
        app.handle(key(KeyCode::Char('나')), now + Duration::from_secs(1));
        assert_eq!(app.state, AppState::Complete);

        app.handle(key(KeyCode::Char('r')), now + Duration::from_secs(2));
        assert_eq!(app.state, AppState::Typing);
        assert_eq!(app.engine.session().active_input(), "");
    }

    #[test]
    fn test_paste_is_applied() {
        let mut app = text_app("태초에");
        app.handle(TypingEvent::Paste("태초".to_string()), Instant::now());
        assert_eq!(app.engine.session().active_input(), "태초");
    }

    #[test]
    fn test_quit_keys() {
        let mut app = text_app("가");
        assert_eq!(app.handle(key(KeyCode::Esc), Instant::now()), Flow::Quit);

        let ctrl_c = TypingEvent::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(app.handle(ctrl_c, Instant::now()), Flow::Quit);
        assert_eq!(app.engine.session().active_input(), "");
    }

    #[test]
    fn test_q_only_quits_from_summary() {
        let mut app = text_app("가나");
        assert_eq!(app.handle(key(KeyCode::Char('q')), Instant::now()), Flow::Continue);
        assert_eq!(app.engine.session().active_input(), "q");
    }

    #[test]
    fn test_ui_typing_state() {
        let app = text_app("태초에");
        let content = rendered(&app);

        assert!(content.contains("태초에"));
        assert!(content.contains("custom"));
    }

    #[test]
    fn test_ui_complete_state() {
        let mut app = text_app("가");
        app.handle(key(KeyCode::Char('가')), Instant::now());
        assert_eq!(app.state, AppState::Complete);

        let content = rendered(&app);
        assert!(content.contains("(r)etry/(q)uit"));
    }
}
