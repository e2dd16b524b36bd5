//! Token factory: the collaborator that supplies geometry and random
//! attributes for newly created basic tokens.

use crate::config::{BuildError, GeometryConfig};
use crate::rng::SimRng;
use crate::token::{Attribute, BodyGrade, Dimensions, TokenKind};

/// Supplies base geometry and a kind-specific random attribute.
///
/// Renderers that derive sizes from meshes implement this; the core only
/// ever asks for basic kinds.
pub trait TokenFactory: std::fmt::Debug {
    /// Bounding box for a new token of `kind`.
    fn geometry(&self, kind: TokenKind) -> Dimensions;

    /// Random attribute for a new token of `kind`. `None` for kinds that
    /// cannot be created directly.
    fn attribute(&self, kind: TokenKind, rng: &mut SimRng) -> Option<Attribute>;
}

/// Default factory: configurable box sizes and the standard distributions
/// (Base uniform in `[0, 100)`, Body uniform over `A|B|C`, Detail uniform in
/// `[-30, 30)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardFactory {
    base: Dimensions,
    body: Dimensions,
    detail: Dimensions,
}

impl StandardFactory {
    pub const BASE_RANGE: (i32, i32) = (0, 100);
    pub const DETAIL_RANGE: (i32, i32) = (-30, 30);

    pub fn new(base: Dimensions, body: Dimensions, detail: Dimensions) -> Self {
        Self { base, body, detail }
    }

    /// Fails when a configured box has a negative side or one that does not
    /// fit the fixed-point range.
    pub fn from_config(config: &GeometryConfig) -> Result<Self, BuildError> {
        let dims = |kind: TokenKind, size: [f64; 3]| {
            let [w, h, d] = size;
            Dimensions::from_f64(w, h, d).ok_or(BuildError::Geometry { kind, size })
        };
        Ok(Self::new(
            dims(TokenKind::Base, config.base)?,
            dims(TokenKind::Body, config.body)?,
            dims(TokenKind::Detail, config.detail)?,
        ))
    }
}

impl Default for StandardFactory {
    fn default() -> Self {
        Self::new(Dimensions::unit(), Dimensions::unit(), Dimensions::unit())
    }
}

impl TokenFactory for StandardFactory {
    fn geometry(&self, kind: TokenKind) -> Dimensions {
        match kind {
            TokenKind::Body => self.body,
            TokenKind::Detail => self.detail,
            _ => self.base,
        }
    }

    fn attribute(&self, kind: TokenKind, rng: &mut SimRng) -> Option<Attribute> {
        match kind {
            TokenKind::Base => {
                let (lo, hi) = Self::BASE_RANGE;
                Some(Attribute::Base(rng.range_i32(lo, hi)))
            }
            TokenKind::Body => {
                let grade = BodyGrade::ALL[rng.below(BodyGrade::ALL.len() as u64) as usize];
                Some(Attribute::Body(grade))
            }
            TokenKind::Detail => {
                let (lo, hi) = Self::DETAIL_RANGE;
                Some(Attribute::Detail(rng.range_i32(lo, hi)))
            }
            _ => None,
        }
    }
}
