//! # Map Templates
//!
//! Declarative map layouts parsed from ASCII art. The default template is
//! built once per process behind a [`Lazy`] and stamped into a fresh
//! [`WorldMap`] whenever a world needs one, so repeated world construction
//! (tests, map resets) never re-parses the layout.

use crate::error::{WorldError, WorldResult};
use crate::map::WorldMap;
use crate::types::{MapId, Tile, Vec2};
use once_cell::sync::Lazy;

/// The default island map shared by every world that does not bring its own
/// layout. Parsed on first access.
pub static ATOLL_TEMPLATE: Lazy<MapTemplate> = Lazy::new(|| {
    MapTemplate::parse(
        "atoll",
        &[
            "~~~~~~~~~~~~~~~~~~~~~~~~",
            "~~~~~~~~~ssss~~~~~~~~~~~",
            "~~~~sssss....ss~~~~~~~~~",
            "~~~sss........ss~~~~~~~~",
            "~~ss....oo.....ss~~~~~~~",
            "~~s....o..o.....s~~~~~~~",
            "~~s....o..o....ss~~~~~~~",
            "~~s.....oo......s~~~~~~~",
            "~~ss......##....s~~~~~~~",
            "~~~s......#.....s~~~~~~~",
            "~~~ss.....#....ss~~~~~~~",
            "~~~~ss........ss~~~~~~~~",
            "~~~~~sss.....sss~~~~~~~~",
            "~~~~~~~ssssss~~~~~~~~~~~",
            "~~~~~~~~~~~~~~~~~~~~~~~~",
            "~~~~~~~~~~~~~~~~~~~~~~~~",
        ],
        Vec2::new(12.5, 6.5),
    )
    .expect("default map template must parse")
});

/// A parsed map layout ready to stamp into world maps.
#[derive(Debug, Clone)]
pub struct MapTemplate {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub spawn: Vec2,
    tiles: Vec<Tile>,
}

impl MapTemplate {
    /// Parses an ASCII layout. Every row must be the same length and every
    /// character must be in the legend:
    ///
    /// `.` grass, `,` dirt, `s` sand, `~` water, `o` stone, `#` wall,
    /// space for void.
    pub fn parse(name: impl Into<String>, rows: &[&str], spawn: Vec2) -> WorldResult<Self> {
        let name = name.into();
        let height = rows.len() as u16;
        if height == 0 {
            return Err(WorldError::template("layout has no rows"));
        }
        let width = rows[0].chars().count() as u16;
        let mut tiles = Vec::with_capacity(width as usize * height as usize);
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() as u16 != width {
                return Err(WorldError::template(format!(
                    "row {y} is {} tiles wide, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let tile = legend(ch).ok_or_else(|| {
                    WorldError::template(format!("unknown tile character {ch:?} at ({x}, {y})"))
                })?;
                tiles.push(tile);
            }
        }
        Ok(Self {
            name,
            width,
            height,
            spawn,
            tiles,
        })
    }

    /// Stamps the template into a fresh map with the given id.
    pub fn build(&self, id: MapId) -> WorldMap {
        let mut map = WorldMap::new(id, self.name.clone(), self.width, self.height, Tile::Void);
        for y in 0..self.height {
            for x in 0..self.width {
                // Raw fill; a brand-new map has no subscribers to notify.
                map.fill_tile(x, y, self.tiles[y as usize * self.width as usize + x as usize]);
            }
        }
        map.spawn = self.spawn;
        map
    }
}

fn legend(ch: char) -> Option<Tile> {
    match ch {
        '.' => Some(Tile::Grass),
        ',' => Some(Tile::Dirt),
        's' => Some(Tile::Sand),
        '~' => Some(Tile::Water),
        'o' => Some(Tile::Stone),
        '#' => Some(Tile::Wall),
        ' ' => Some(Tile::Void),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_parses_and_spawn_is_walkable() {
        let map = ATOLL_TEMPLATE.build(MapId(0));
        assert_eq!((map.width, map.height), (24, 16));
        assert!(!map.blocked(map.spawn));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = MapTemplate::parse("bad", &["..", "..."], Vec2::zero()).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn unknown_characters_are_rejected() {
        let err = MapTemplate::parse("bad", &["..", ".x"], Vec2::zero()).unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn build_is_repeatable() {
        let a = ATOLL_TEMPLATE.build(MapId(0));
        let b = ATOLL_TEMPLATE.build(MapId(1));
        assert_eq!(a.tile(12, 6), b.tile(12, 6));
        assert_eq!(b.id, MapId(1));
    }
}
