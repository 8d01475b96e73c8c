//! Operator commands read line by line from stdin.
//!
//! | Input                           | Effect                        |
//! |---------------------------------|-------------------------------|
//! | `p`, `space`, a lone space      | toggle start / pause / resume |
//! | `up` `down` `left` `right`, `ikjl` | steer snake 0              |
//! | `w` `a` `s` `d`                 | steer snake 1                 |
//! | `r`                             | log the leaderboard now       |
//! | `q`                             | quit                          |

use snake_race_types::Direction;

/// A parsed operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start, pause, or resume.
    Toggle,
    /// Steer one snake.
    Steer {
        /// Snake index.
        agent: usize,
        /// New heading.
        direction: Direction,
    },
    /// Log the leaderboard immediately.
    Report,
    /// Stop and exit.
    Quit,
}

impl Command {
    /// Parse one line of input. Unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return (!line.is_empty()).then_some(Self::Toggle);
        }
        let key = trimmed.to_ascii_lowercase();
        let command = match key.as_str() {
            "p" | "space" => Self::Toggle,
            "r" => Self::Report,
            "q" | "quit" | "exit" => Self::Quit,
            "up" | "i" => steer(0, Direction::Up),
            "left" | "j" => steer(0, Direction::Left),
            "down" | "k" => steer(0, Direction::Down),
            "right" | "l" => steer(0, Direction::Right),
            "w" => steer(1, Direction::Up),
            "a" => steer(1, Direction::Left),
            "s" => steer(1, Direction::Down),
            "d" => steer(1, Direction::Right),
            _ => return None,
        };
        Some(command)
    }
}

const fn steer(agent: usize, direction: Direction) -> Command {
    Command::Steer { agent, direction }
}
