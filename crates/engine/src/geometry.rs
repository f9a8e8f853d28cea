use serde::{Deserialize, Serialize};

/// Topmost floor index that is still above ground.
pub const SEA_FLOOR: u8 = 7;
/// Deepest floor index.
pub const MAX_Z: u8 = 15;
pub const FLOOR_COUNT: usize = MAX_Z as usize + 1;
pub const UNDERGROUND_FLOOR: u8 = SEA_FLOOR + 1;
/// Number of floors visible above and below the camera while underground.
pub const AWARE_UNDERGROUND_FLOOR_RANGE: u8 = 2;

pub const TILE_PIXELS: i32 = 32;
pub const MAX_ELEVATION: i32 = 24;

const MAX_COORDINATE: i32 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: u8,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: u8) -> Self {
        Self { x, y, z }
    }

    pub fn is_valid(self) -> bool {
        (0..MAX_COORDINATE).contains(&self.x)
            && (0..MAX_COORDINATE).contains(&self.y)
            && self.z <= MAX_Z
    }

    pub fn translated(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z,
        }
    }

    /// One floor higher. `None` above the top floor.
    pub fn up(self) -> Option<Self> {
        let z = self.z.checked_sub(1)?;
        Some(Self { z, ..self })
    }

    /// One floor lower. `None` below the deepest floor.
    pub fn down(self) -> Option<Self> {
        if self.z >= MAX_Z {
            return None;
        }
        Some(Self {
            z: self.z + 1,
            ..self
        })
    }

    /// The position `n` floors up that visually overlaps this one on screen.
    ///
    /// Isometric stacking shifts every floor above by one tile towards the
    /// bottom-right, so the overlapping position moves `+n` on both axes.
    pub fn covered_up(self, n: u8) -> Option<Self> {
        let z = self.z.checked_sub(n)?;
        let shifted = Self {
            x: self.x + i32::from(n),
            y: self.y + i32::from(n),
            z,
        };
        shifted.is_valid().then_some(shifted)
    }

    /// Inverse of [`Position::covered_up`].
    pub fn covered_down(self, n: u8) -> Option<Self> {
        let z = self.z.checked_add(n).filter(|z| *z <= MAX_Z)?;
        let shifted = Self {
            x: self.x - i32::from(n),
            y: self.y - i32::from(n),
            z,
        };
        shifted.is_valid().then_some(shifted)
    }

    pub fn is_in_range(
        self,
        other: Position,
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
        ignore_z: bool,
    ) -> bool {
        (ignore_z || other.z == self.z)
            && other.x >= self.x - min_x
            && other.x <= self.x + max_x
            && other.y >= self.y - min_y
            && other.y <= self.y + max_y
    }

    pub fn neighbors(self) -> [Position; 8] {
        [
            self.translated(-1, -1),
            self.translated(0, -1),
            self.translated(1, -1),
            self.translated(-1, 0),
            self.translated(1, 0),
            self.translated(-1, 1),
            self.translated(0, 1),
            self.translated(1, 1),
        ]
    }

    pub fn translated_to_direction(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        self.translated(dx, dy)
    }

    /// Direction of travel from `self` to `to`, ignoring the floor.
    pub fn direction_to(self, to: Position) -> Option<Direction> {
        let dx = (to.x - self.x).signum();
        let dy = (to.y - self.y).signum();
        Direction::from_offset(dx, dy)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::NorthEast => (1, -1),
            Direction::SouthEast => (1, 1),
            Direction::SouthWest => (-1, 1),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn from_offset(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Direction::North),
            (1, 0) => Some(Direction::East),
            (0, 1) => Some(Direction::South),
            (-1, 0) => Some(Direction::West),
            (1, -1) => Some(Direction::NorthEast),
            (1, 1) => Some(Direction::SouthEast),
            (-1, 1) => Some(Direction::SouthWest),
            (-1, -1) => Some(Direction::NorthWest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: (self.x as f32 * factor).round() as i32,
            y: (self.y as f32 * factor).round() as i32,
        }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> i32 {
        self.width * self.height
    }

    pub fn scaled(self, factor: i32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    pub const fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    pub fn contains(self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.y >= self.origin.y
            && point.x < self.origin.x + self.size.width
            && point.y < self.origin.y + self.size.height
    }

    pub fn center(self) -> Point {
        Point::new(
            self.origin.x + self.size.width / 2,
            self.origin.y + self.size.height / 2,
        )
    }
}

/// Tiles kept around the camera in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AwareRange {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl AwareRange {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn horizontal(self) -> i32 {
        self.left + self.right + 1
    }

    pub fn vertical(self) -> i32 {
        self.top + self.bottom + 1
    }

    pub fn dimension(self) -> Size {
        Size::new(self.horizontal(), self.vertical())
    }
}
