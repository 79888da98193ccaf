pub mod test_helpers {
    use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Builder for creating test scenarios with simulated user input
    #[derive(Default)]
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self { events: Vec::new() }
        }

        /// Add a character key press
        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        /// Type every character of `text`
        pub fn type_text(mut self, text: &str) -> Self {
            self.events
                .extend(text.chars().map(SimulatedEventSource::char_key));
            self
        }

        fn press(mut self, code: KeyCode) -> Self {
            self.events
                .push(SimulatedEventSource::key_event(code, KeyModifiers::empty()));
            self
        }

        pub fn press_enter(self) -> Self {
            self.press(KeyCode::Enter)
        }

        pub fn press_tab(self) -> Self {
            self.press(KeyCode::Tab)
        }

        pub fn press_backtab(self) -> Self {
            self.press(KeyCode::BackTab)
        }

        pub fn press_esc(self) -> Self {
            self.press(KeyCode::Esc)
        }

        pub fn press_backspace(self) -> Self {
            self.press(KeyCode::Backspace)
        }

        /// Navigate down n times (press 'j' n times)
        pub fn navigate_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('j'));
            }
            self
        }

        pub fn mouse_move(mut self, column: u16, row: u16) -> Self {
            self.events
                .push(SimulatedEventSource::mouse_move(column, row));
            self
        }

        pub fn mouse_click(mut self, column: u16, row: u16) -> Self {
            self.events
                .push(SimulatedEventSource::mouse_click(column, row));
            self
        }

        /// Quit the application (Ctrl+C)
        pub fn quit(mut self) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key('c'));
            self
        }

        /// Build the simulated event source
        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            // Trim trailing whitespace from each line
            lines.push(line.trim_end().to_string());
        }

        // Remove trailing empty lines
        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }

        lines.join("\n")
    }

    /// Row and column of the first occurrence of `needle` on screen
    pub fn find_text(terminal: &Terminal<TestBackend>, needle: &str) -> Option<(u16, u16)> {
        capture_terminal_state(terminal)
            .lines()
            .enumerate()
            .find_map(|(row, line)| {
                line.find(needle).map(|byte| {
                    let column = line[..byte].chars().count();
                    (column as u16, row as u16)
                })
            })
    }
}
