//! Static evaluation: material count plus a fixed tempo bonus for the side
//! to move. No positional terms — Ataxx's capture-on-every-move dynamics
//! make material count by far the dominant signal, and the reference engine
//! this is grounded on never grew past it.

use crate::bitboard::popcount;
use crate::position::Position;
use crate::types::Color;

pub const TEMPO: i32 = 15;
pub const MATERIAL_WEIGHT: i32 = 200;

#[must_use]
pub fn evaluate(pos: &Position) -> i32 {
    let white = popcount(pos.color_bb(Color::White)) as i32;
    let black = popcount(pos.color_bb(Color::Black)) as i32;
    let material = MATERIAL_WEIGHT * (white - black);

    let signed = if pos.side_to_move() == Color::White {
        material
    } else {
        -material
    };

    signed + TEMPO
}
