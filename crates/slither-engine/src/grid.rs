//! Grid math shared by the authoritative engine and the client mirror.
//!
//! There is exactly one movement rule, [`Board::step_wrapped`]. The server
//! calls it with a cell size of 1 (abstract grid units); the client calls it
//! with its negotiated tile size so positions stay in device pixels. Keeping
//! both sides on the same function is what makes local prediction line up
//! with authoritative motion.

use serde::{Deserialize, Serialize};

/// Movement direction, numbered as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Direction {
    Right = 0,
    Down = 1,
    Left = 2,
    Up = 3,
}

impl Direction {
    /// The exact reversal of this direction.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Up => Direction::Down,
        }
    }

    /// Per-axis unit delta.
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Up => (0, -1),
        }
    }
}

impl From<Direction> for u8 {
    fn from(dir: Direction) -> u8 {
        dir as u8
    }
}

impl TryFrom<u8> for Direction {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Right),
            1 => Ok(Direction::Down),
            2 => Ok(Direction::Left),
            3 => Ok(Direction::Up),
            _ => Err("direction must be 0-3"),
        }
    }
}

/// One cell position. Grid units on the server, device pixels on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> GridPos {
        GridPos { x, y }
    }
}

/// Board dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub width: i32,
    pub height: i32,
}

impl Board {
    pub const fn new(width: i32, height: i32) -> Board {
        Board { width, height }
    }

    /// Advances `pos` one step of `cell` units in `dir`, wrapping each axis
    /// independently and toroidally.
    ///
    /// Leaving past the upper bound re-enters at 0; leaving below 0 re-enters
    /// at the far edge. A wrap is one logical step like any other, never a
    /// multi-cell jump.
    pub fn step_wrapped(&self, pos: GridPos, dir: Direction, cell: i32) -> GridPos {
        let (dx, dy) = dir.delta();
        let max_x = self.width * cell;
        let max_y = self.height * cell;

        let mut x = pos.x + dx * cell;
        let mut y = pos.y + dy * cell;

        if x < 0 {
            x = max_x - cell;
        } else if x >= max_x {
            x = 0;
        }
        if y < 0 {
            y = max_y - cell;
        } else if y >= max_y {
            y = 0;
        }

        GridPos { x, y }
    }
}
