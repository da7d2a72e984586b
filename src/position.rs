//! Position: board state, make/unmake, FEN, and repetition detection.

use crate::bitboard::{popcount, BOARD_MASK};
use crate::error::{EngineError, EngineResult};
use crate::moves::Move;
use crate::types::{Color, Square};
use crate::zobrist::ZOBRIST;

pub const START_FEN: &str = "x5o/7/7/7/7/7/o5x x 0 1";

/// One entry of undo information, pushed before a move is made and popped on
/// unmake. `key_before`/`rule50_before` are the values to restore; `captures`
/// is the set of squares flipped by the move, restored to the opponent's
/// color on unmake.
#[derive(Clone, Copy, Debug)]
struct HistoryEntry {
    key_before: u64,
    rule50_before: u32,
    captures: u64,
    mv: Move,
}

#[derive(Clone)]
pub struct Position {
    piece_bb: u64,
    color_bb: [u64; 2],
    stm: Color,
    rule50: u32,
    move_number: u32,
    key: u64,
    nodes: u64,
    history: Vec<HistoryEntry>,
}

impl Position {
    #[must_use]
    pub fn startpos() -> Position {
        Position::from_fen(START_FEN).expect("START_FEN is well-formed")
    }

    /// Parses a 7x7 Ataxx FEN: board ranks 7->1 separated by `/`, `x`/`o`
    /// pieces, digits 1-7 for empty runs, then side to move, rule50 counter,
    /// and move number.
    pub fn from_fen(fen: &str) -> EngineResult<Position> {
        let mut fields = fen.split_whitespace();
        let board_field = fields
            .next()
            .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))?;
        let stm_field = fields
            .next()
            .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))?;
        let rule50_field = fields.next().unwrap_or("0");
        let move_number_field = fields.next().unwrap_or("1");

        let mut piece_bb = 0u64;
        let mut color_bb = [0u64; 2];

        let ranks: Vec<&str> = board_field.split('/').collect();
        if ranks.len() != 7 {
            return Err(EngineError::InvalidFen(fen.to_string()));
        }

        for (rank_from_top, rank_str) in ranks.iter().enumerate() {
            let rank = 6 - rank_from_top as u8;
            let mut file = 0u8;
            for c in rank_str.chars() {
                if file >= 7 {
                    return Err(EngineError::InvalidFen(fen.to_string()));
                }
                match c {
                    'x' | 'o' => {
                        let color = Color::from_char(c).unwrap();
                        let sq = Square::new(file, rank);
                        piece_bb |= 1u64 << sq.0;
                        color_bb[color.index()] |= 1u64 << sq.0;
                        file += 1;
                    }
                    '1'..='7' => {
                        file += c as u8 - b'0';
                    }
                    _ => return Err(EngineError::InvalidFen(fen.to_string())),
                }
            }
        }

        let stm = Color::from_char(stm_field.chars().next().unwrap_or(' '))
            .ok_or_else(|| EngineError::InvalidFen(fen.to_string()))?;
        let rule50: u32 = rule50_field
            .parse()
            .map_err(|_| EngineError::InvalidFen(fen.to_string()))?;
        let move_number: u32 = move_number_field
            .parse()
            .map_err(|_| EngineError::InvalidFen(fen.to_string()))?;

        let mut pos = Position {
            piece_bb,
            color_bb,
            stm,
            rule50,
            move_number,
            key: 0,
            nodes: 0,
            history: Vec::with_capacity(64),
        };
        pos.key = pos.key_from_scratch();
        Ok(pos)
    }

    #[must_use]
    pub fn to_fen(&self) -> String {
        let mut s = String::new();
        for rank_from_top in 0..7u8 {
            let rank = 6 - rank_from_top;
            let mut empty_run = 0u8;
            for file in 0..7u8 {
                let sq = Square::new(file, rank);
                let bit = 1u64 << sq.0;
                if self.piece_bb & bit == 0 {
                    empty_run += 1;
                    continue;
                }
                if empty_run > 0 {
                    s.push((b'0' + empty_run) as char);
                    empty_run = 0;
                }
                let color = if self.color_bb[Color::White.index()] & bit != 0 {
                    Color::White
                } else {
                    Color::Black
                };
                s.push(color.to_char());
            }
            if empty_run > 0 {
                s.push((b'0' + empty_run) as char);
            }
            if rank_from_top != 6 {
                s.push('/');
            }
        }
        s.push(' ');
        s.push(self.stm.to_char());
        s.push_str(&format!(" {} {}", self.rule50, self.move_number));
        s
    }

    fn key_from_scratch(&self) -> u64 {
        let mut key = 0u64;
        for color in [Color::Black, Color::White] {
            let mut bb = self.color_bb[color.index()];
            while bb != 0 {
                let sq = crate::bitboard::pop_lsb(&mut bb) as u8;
                key ^= ZOBRIST.piece(color, sq);
            }
        }
        if self.stm == Color::White {
            key ^= ZOBRIST.side_key;
        }
        key
    }

    #[inline]
    #[must_use]
    pub fn occupied(&self) -> u64 {
        self.piece_bb
    }

    #[inline]
    #[must_use]
    pub fn color_bb(&self, color: Color) -> u64 {
        self.color_bb[color.index()]
    }

    #[inline]
    #[must_use]
    pub fn side_to_move(&self) -> Color {
        self.stm
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> u64 {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn rule50(&self) -> u32 {
        self.rule50
    }

    #[inline]
    #[must_use]
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    #[inline]
    #[must_use]
    pub fn ply(&self) -> usize {
        self.history.len()
    }

    /// The move that produced the current position, or `None` at the root
    /// of the game/history. Used by the search's static-eval rule for
    /// nodes reached by a forced pass (`Move::Null`).
    #[must_use]
    pub fn last_move(&self) -> Option<Move> {
        self.history.last().map(|entry| entry.mv)
    }

    /// True once all 49 playable squares are filled (the game-over condition
    /// alongside a side having zero pieces).
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.piece_bb & BOARD_MASK == BOARD_MASK
    }

    fn place(&mut self, sq: Square, color: Color, hash: bool) {
        let bit = 1u64 << sq.0;
        self.piece_bb |= bit;
        self.color_bb[color.index()] |= bit;
        if hash {
            self.key ^= ZOBRIST.piece(color, sq.0);
        }
    }

    fn remove(&mut self, sq: Square, color: Color, hash: bool) {
        let bit = 1u64 << sq.0;
        self.piece_bb &= !bit;
        self.color_bb[color.index()] &= !bit;
        if hash {
            self.key ^= ZOBRIST.piece(color, sq.0);
        }
    }

    fn relocate(&mut self, from: Square, to: Square, color: Color, hash: bool) {
        let mask = (1u64 << from.0) | (1u64 << to.0);
        self.piece_bb ^= mask;
        self.color_bb[color.index()] ^= mask;
        if hash {
            self.key ^= ZOBRIST.piece(color, from.0) ^ ZOBRIST.piece(color, to.0);
        }
    }

    /// Applies `mv`, which must be pseudo-legal in the current position.
    /// Clone moves reset `rule50` to zero; jump and null (pass) moves
    /// increment it.
    pub fn make_move(&mut self, mv: Move) {
        let key_before = self.key;
        let rule50_before = self.rule50;
        let mover = self.stm;
        let opponent = mover.flip();

        let flip_targets = match mv {
            Move::Clone { to } => {
                self.place(to, mover, true);
                self.rule50 = 0;
                crate::bitboard::single_move_bb(to.0, self.color_bb(opponent))
            }
            Move::Jump { from, to } => {
                self.relocate(from, to, mover, true);
                self.rule50 += 1;
                crate::bitboard::single_move_bb(to.0, self.color_bb(opponent))
            }
            Move::Null => {
                self.rule50 += 1;
                0
            }
        };

        let mut captures = flip_targets;
        while captures != 0 {
            let victim = Square(crate::bitboard::pop_lsb(&mut captures) as u8);
            self.remove(victim, opponent, true);
            self.place(victim, mover, true);
        }

        self.history.push(HistoryEntry {
            key_before,
            rule50_before,
            captures: flip_targets,
            mv,
        });

        self.stm = opponent;
        self.key ^= ZOBRIST.side_key;
        self.nodes += 1;
        if self.stm == Color::White {
            self.move_number += 1;
        }
    }

    /// Undoes the most recently made move.
    pub fn unmake_move(&mut self) {
        let entry = self.history.pop().expect("unmake_move with empty history");

        let mover = self.stm.flip();
        self.stm = mover;
        if self.stm == Color::White {
            self.move_number -= 1;
        }

        match entry.mv {
            Move::Clone { to } => self.remove(to, mover, false),
            Move::Jump { from, to } => self.relocate(to, from, mover, false),
            Move::Null => {}
        }

        let opponent = mover.flip();
        let mut captures = entry.captures;
        while captures != 0 {
            let victim = Square(crate::bitboard::pop_lsb(&mut captures) as u8);
            self.remove(victim, mover, false);
            self.place(victim, opponent, false);
        }

        self.key = entry.key_before;
        self.rule50 = entry.rule50_before;
        self.nodes -= 1;
    }

    /// True if the current key has occurred earlier in the game within the
    /// last `rule50` plies, walking backward in steps of 2 (a repetition
    /// must be an even number of plies back, since a single ply always
    /// changes the side to move's captured-piece count).
    #[must_use]
    pub fn is_repetition(&self) -> bool {
        let limit = self.rule50 as usize;
        let len = self.history.len();
        if limit < 2 || len < 2 {
            return false;
        }
        let mut back = 2usize;
        // history[len-1] is the most recent move; walking back 2 plies at a
        // time compares positions with the same side to move.
        while back <= limit && back <= len {
            let idx = len - back;
            if self.history[idx].key_before == self.key {
                return true;
            }
            back += 2;
        }
        false
    }

    #[must_use]
    pub fn material_diff(&self) -> i32 {
        popcount(self.color_bb(Color::White)) as i32 - popcount(self.color_bb(Color::Black)) as i32
    }
}
