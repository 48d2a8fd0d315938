use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use versetype::compare::{Cell, Status};
use versetype::content::TextUnit;
use versetype::session::SessionPhase;
use versetype::util::format_elapsed;

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;

fn bold() -> Style {
    Style::default().add_modifier(Modifier::BOLD)
}

fn dim_bold() -> Style {
    bold().add_modifier(Modifier::DIM)
}

fn cell_style(status: Status) -> Style {
    match status {
        Status::Correct => bold().fg(Color::Green),
        Status::Incorrect => bold().fg(Color::Red),
        Status::Current => dim_bold().add_modifier(Modifier::UNDERLINED),
        Status::Pending => dim_bold(),
    }
}

/// Left and right text on one row, padded by display width so wide
/// Hangul glyphs line up.
fn spread(left: &str, right: &str, width: u16) -> String {
    let used = left.width() + right.width();
    let gap = (width as usize).saturating_sub(used).max(1);
    format!("{left}{}{right}", " ".repeat(gap))
}

fn cells_line(cells: &[Cell]) -> Vec<Span<'static>> {
    cells
        .iter()
        .map(|cell| {
            let text = match (cell.status, cell.text.as_str()) {
                (Status::Incorrect, " ") => "·".to_owned(),
                _ => cell.text.clone(),
            };
            Span::styled(text, cell_style(cell.status))
        })
        .collect()
}

impl App {
    fn header_line(&self, width: u16) -> String {
        let snapshot = self.engine.snapshot();
        let label = self
            .engine
            .session()
            .active_unit()
            .map(|unit| unit.label.clone())
            .unwrap_or_default();
        let stats = format!(
            "{}  {:.1}%  {:.0} cpm",
            format_elapsed(snapshot.elapsed()),
            snapshot.accuracy(),
            snapshot.speed
        );
        spread(&label, &stats, width)
    }

    fn unit_lines(&self, unit: &TextUnit, active: bool) -> Vec<Line<'static>> {
        let label = Span::styled(format!("{:>3} ", unit.number), dim_bold());
        let session = self.engine.session();
        let visited = session.comparator(unit.id).filter(|cmp| active || !cmp.input().is_empty());

        let mut spans = vec![label];
        match visited {
            Some(cmp) => spans.extend(cells_line(&cmp.cells())),
            None => spans.push(Span::styled(unit.text.clone(), dim_bold())),
        }
        let mut lines = vec![Line::from(spans)];

        if active {
            let input = session.active_input().to_string();
            lines.push(Line::from(vec![
                Span::styled("  > ", Style::default().fg(Color::Magenta)),
                Span::styled(input, bold()),
            ]));
        }
        lines
    }

    fn status_line(&self) -> Line<'static> {
        if let Some(message) = &self.status {
            return Line::from(Span::styled(message.clone(), bold().fg(Color::Red)));
        }
        let hint = match self.engine.session().phase() {
            SessionPhase::PageBoundary | SessionPhase::ChapterBoundary => "loading...",
            _ => "(enter) next / (backspace) back / (esc)ape",
        };
        Line::from(Span::styled(hint, Style::default().add_modifier(Modifier::ITALIC)))
    }

    fn render_typing(&self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(self.header_line(chunks[0].width))
            .style(bold())
            .render(chunks[0], buf);

        let progress = self.engine.snapshot().progress();
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .ratio((progress / 100.0).clamp(0.0, 1.0))
            .label(format!("{progress:.0}%"))
            .render(chunks[1], buf);

        let session = self.engine.session();
        let active = session.active_index();
        let lines: Vec<Line> = session
            .units()
            .iter()
            .enumerate()
            .flat_map(|(idx, unit)| self.unit_lines(unit, Some(idx) == active))
            .collect();

        // Keep the active unit on screen when the page is taller than the pane.
        let scroll = (active.unwrap_or(0) as u16).saturating_sub(chunks[3].height / 2);

        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .scroll((scroll, 0))
            .render(chunks[3], buf);

        Paragraph::new(self.status_line()).render(chunks[4], buf);
    }

    fn render_complete(&self, area: Rect, buf: &mut Buffer) {
        let summary = self.engine.summary();
        let mut lines = vec![
            Line::from(Span::styled("완료", bold().fg(Color::Green))),
            Line::default(),
            Line::from(format!(
                "{:.0} cpm / {:.1}% acc / {}",
                summary.stats.speed,
                summary.stats.accuracy(),
                format_elapsed(summary.stats.elapsed())
            )),
            Line::from(format!("{} verses typed", summary.units_typed)),
        ];
        if let (Some(mean), Some(sd)) = (summary.mean_unit_accuracy, summary.unit_accuracy_std_dev) {
            lines.push(Line::from(format!("per verse {mean:.1}% ± {sd:.1}")));
        }
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "(r)etry / (q)uit / (esc)ape",
            Style::default().add_modifier(Modifier::ITALIC),
        )));

        let height = lines.len() as u16;
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .constraints([
                Constraint::Length(area.height.saturating_sub(height) / 2),
                Constraint::Length(height),
                Constraint::Min(0),
            ])
            .split(area);

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .render(chunks[1], buf);
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match self.state {
            AppState::Typing => self.render_typing(area, buf),
            AppState::Complete => self.render_complete(area, buf),
        }
    }
}
