//! Token model: the parts that flow through a production line.
//!
//! A token is either *basic* (created by a provider, carrying a random
//! attribute) or *composite* (built by an assembler from exactly two
//! constituents, which it owns). Composite kind and dimensions are a pure
//! function of the constituents, looked up in a fixed rule table.

use serde::{Deserialize, Serialize};

use crate::fixed::{Fixed64, Ticks, f64_to_fixed64, fixed64_to_f64};
use crate::id::{StageId, TokenId};

// ---------------------------------------------------------------------------
// Kinds and attributes
// ---------------------------------------------------------------------------

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    /// Raw part A. Carries an integer attribute in `[0, 100)`.
    Base,
    /// Raw part B. Carries a grade `A`, `B` or `C`.
    Body,
    /// Raw part C. Carries an integer attribute in `[-30, 30)`.
    Detail,
    Composite2,
    Composite3,
    Composite4,
    /// Result of composing a pair with no rule. Never produced by a provider.
    Invalid,
}

impl TokenKind {
    pub const ALL: [TokenKind; 7] = [
        TokenKind::Base,
        TokenKind::Body,
        TokenKind::Detail,
        TokenKind::Composite2,
        TokenKind::Composite3,
        TokenKind::Composite4,
        TokenKind::Invalid,
    ];

    /// Kinds a provider is allowed to create.
    pub const BASIC: [TokenKind; 3] = [TokenKind::Base, TokenKind::Body, TokenKind::Detail];

    pub fn is_basic(self) -> bool {
        matches!(self, TokenKind::Base | TokenKind::Body | TokenKind::Detail)
    }

    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Base => "Base",
            TokenKind::Body => "Body",
            TokenKind::Detail => "Detail",
            TokenKind::Composite2 => "Composite2",
            TokenKind::Composite3 => "Composite3",
            TokenKind::Composite4 => "Composite4",
            TokenKind::Invalid => "Invalid",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Category carried by a [`TokenKind::Body`] token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyGrade {
    A,
    B,
    C,
}

impl BodyGrade {
    pub const ALL: [BodyGrade; 3] = [BodyGrade::A, BodyGrade::B, BodyGrade::C];
}

impl std::fmt::Display for BodyGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BodyGrade::A => "A",
            BodyGrade::B => "B",
            BodyGrade::C => "C",
        };
        f.write_str(s)
    }
}

/// Kind-specific random attribute of a basic token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Base(i32),
    Body(BodyGrade),
    Detail(i32),
}

impl Attribute {
    pub fn kind(&self) -> TokenKind {
        match self {
            Attribute::Base(_) => TokenKind::Base,
            Attribute::Body(_) => TokenKind::Body,
            Attribute::Detail(_) => TokenKind::Detail,
        }
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Attribute::Base(v) | Attribute::Detail(v) => write!(f, "{v}"),
            Attribute::Body(grade) => write!(f, "{grade}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Bounding box of a token, in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: Fixed64,
    pub height: Fixed64,
    pub depth: Fixed64,
}

impl Dimensions {
    pub fn new(width: Fixed64, height: Fixed64, depth: Fixed64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Initialization-only helper. `None` unless every side is a
    /// non-negative value that fits the fixed-point range.
    pub fn from_f64(width: f64, height: f64, depth: f64) -> Option<Self> {
        let side = |v: f64| f64_to_fixed64(v).filter(|f| *f >= Fixed64::ZERO);
        Some(Self::new(side(width)?, side(height)?, side(depth)?))
    }

    pub fn unit() -> Self {
        Self::new(Fixed64::ONE, Fixed64::ONE, Fixed64::ONE)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} x {:.2} x {:.2}",
            fixed64_to_f64(self.width),
            fixed64_to_f64(self.height),
            fixed64_to_f64(self.depth)
        )
    }
}

/// How two constituents are placed relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Next to each other along the width axis.
    SideBySide,
    /// The second on top of the first.
    Stacked,
}

impl Layout {
    /// Bounding box of two boxes placed with this layout. Summed sides
    /// saturate at the top of the fixed-point range.
    pub fn combine(self, a: Dimensions, b: Dimensions) -> Dimensions {
        match self {
            Layout::SideBySide => Dimensions::new(
                a.width.saturating_add(b.width),
                a.height.max(b.height),
                a.depth.max(b.depth),
            ),
            Layout::Stacked => Dimensions::new(
                a.width.max(b.width),
                a.height.saturating_add(b.height),
                a.depth.max(b.depth),
            ),
        }
    }
}

/// One entry of the composition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionRule {
    pub result: TokenKind,
    pub layout: Layout,
}

/// Look up the rule for a pair of kinds. The pair is unordered.
pub fn composition_rule(a: TokenKind, b: TokenKind) -> Option<CompositionRule> {
    use TokenKind::*;
    let (result, layout) = match (a, b) {
        (Base, Base) => (Composite2, Layout::SideBySide),
        (Composite2, Body) | (Body, Composite2) => (Composite3, Layout::Stacked),
        (Composite3, Detail) | (Detail, Composite3) => (Composite4, Layout::Stacked),
        _ => return None,
    };
    Some(CompositionRule { result, layout })
}

/// Result kind and dimensions of composing two tokens. Unknown pairs yield
/// [`TokenKind::Invalid`] with side-by-side dimensions.
pub fn compose_shape(
    a_kind: TokenKind,
    a_dims: Dimensions,
    b_kind: TokenKind,
    b_dims: Dimensions,
) -> (TokenKind, Dimensions) {
    match composition_rule(a_kind, b_kind) {
        Some(rule) => (rule.result, rule.layout.combine(a_dims, b_dims)),
        None => (
            TokenKind::Invalid,
            Layout::SideBySide.combine(a_dims, b_dims),
        ),
    }
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// What a token is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenPayload {
    Basic(Attribute),
    Composite { first: Box<Token>, second: Box<Token> },
}

/// A part in the production line. Moved between stages by value; exactly
/// one stage holds it at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    id: TokenId,
    kind: TokenKind,
    dimensions: Dimensions,
    created_at: Ticks,
    creation_stage: StageId,
    payload: TokenPayload,
}

impl Token {
    /// A basic token. Its kind follows from the attribute.
    pub fn basic(
        id: TokenId,
        attribute: Attribute,
        dimensions: Dimensions,
        created_at: Ticks,
        creation_stage: StageId,
    ) -> Self {
        Self {
            id,
            kind: attribute.kind(),
            dimensions,
            created_at,
            creation_stage,
            payload: TokenPayload::Basic(attribute),
        }
    }

    /// A composite built from two constituents, which it takes ownership of.
    pub fn compose(first: Token, second: Token, created_at: Ticks, creation_stage: StageId) -> Self {
        let (kind, dimensions) =
            compose_shape(first.kind, first.dimensions, second.kind, second.dimensions);
        if kind == TokenKind::Invalid {
            tracing::error!(
                first = %first.id,
                second = %second.id,
                first_kind = %first.kind,
                second_kind = %second.kind,
                "no composition rule for pair"
            );
        }
        Self {
            id: TokenId::composite(&first.id, &second.id),
            kind,
            dimensions,
            created_at,
            creation_stage,
            payload: TokenPayload::Composite {
                first: Box::new(first),
                second: Box::new(second),
            },
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn created_at(&self) -> Ticks {
        self.created_at
    }

    pub fn creation_stage(&self) -> StageId {
        self.creation_stage
    }

    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    /// The attribute of a basic token.
    pub fn attribute(&self) -> Option<Attribute> {
        match &self.payload {
            TokenPayload::Basic(attr) => Some(*attr),
            TokenPayload::Composite { .. } => None,
        }
    }

    /// The two constituents of a composite token.
    pub fn constituents(&self) -> Option<(&Token, &Token)> {
        match &self.payload {
            TokenPayload::Basic(_) => None,
            TokenPayload::Composite { first, second } => Some((first, second)),
        }
    }

    /// Attribute values inspected by a quality gate. Only a composite of two
    /// `Base` tokens has them.
    pub fn quality_values(&self) -> Option<(i32, i32)> {
        let (first, second) = self.constituents()?;
        match (first.attribute()?, second.attribute()?) {
            (Attribute::Base(a), Attribute::Base(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// One-line description of what the token carries.
    pub fn detail(&self) -> String {
        match &self.payload {
            TokenPayload::Basic(attr) => format!("attribute {attr}"),
            TokenPayload::Composite { first, second } => {
                format!("made of {} ({}) and {} ({})", first.id, first.kind, second.id, second.kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> StageId {
        StageId::default()
    }

    fn base(id: &str, value: i32) -> Token {
        Token::basic(id.into(), Attribute::Base(value), Dimensions::unit(), 0, stage())
    }

    fn body(id: &str) -> Token {
        Token::basic(
            id.into(),
            Attribute::Body(BodyGrade::B),
            Dimensions::from_f64(2.0, 1.0, 1.0).unwrap(),
            0,
            stage(),
        )
    }

    fn detail(id: &str) -> Token {
        Token::basic(
            id.into(),
            Attribute::Detail(-4),
            Dimensions::from_f64(0.5, 0.5, 0.5).unwrap(),
            0,
            stage(),
        )
    }

    #[test]
    fn basic_kind_follows_attribute() {
        assert_eq!(base("A", 1).kind(), TokenKind::Base);
        assert_eq!(body("B").kind(), TokenKind::Body);
        assert_eq!(detail("C").kind(), TokenKind::Detail);
    }

    #[test]
    fn base_pair_sits_side_by_side() {
        let c = Token::compose(base("A", 1), base("B", 2), 5, stage());
        assert_eq!(c.kind(), TokenKind::Composite2);
        assert_eq!(c.dimensions(), Dimensions::from_f64(2.0, 1.0, 1.0).unwrap());
        assert_eq!(c.id().as_str(), "A+B");
        assert_eq!(c.created_at(), 5);
    }

    #[test]
    fn body_stacks_on_composite2() {
        let c2 = Token::compose(base("A", 1), base("B", 2), 0, stage());
        let c3 = Token::compose(c2, body("C"), 0, stage());
        assert_eq!(c3.kind(), TokenKind::Composite3);
        assert_eq!(c3.dimensions(), Dimensions::from_f64(2.0, 2.0, 1.0).unwrap());
    }

    #[test]
    fn detail_stacks_on_composite3() {
        let c2 = Token::compose(base("A", 1), base("B", 2), 0, stage());
        let c3 = Token::compose(c2, body("C"), 0, stage());
        let c4 = Token::compose(c3, detail("D"), 0, stage());
        assert_eq!(c4.kind(), TokenKind::Composite4);
        assert_eq!(c4.dimensions(), Dimensions::from_f64(2.0, 2.5, 1.0).unwrap());
        assert_eq!(c4.id().as_str(), "A+B+C+D");
    }

    #[test]
    fn rule_table_is_order_insensitive() {
        for a in TokenKind::ALL {
            for b in TokenKind::ALL {
                assert_eq!(composition_rule(a, b), composition_rule(b, a));
            }
        }
    }

    #[test]
    fn unknown_pair_is_invalid() {
        let c = Token::compose(base("A", 1), body("B"), 0, stage());
        assert_eq!(c.kind(), TokenKind::Invalid);
        assert_eq!(c.dimensions(), Dimensions::from_f64(3.0, 1.0, 1.0).unwrap());
    }

    #[test]
    fn quality_values_only_for_base_pairs() {
        let c2 = Token::compose(base("A", 40), base("B", 50), 0, stage());
        assert_eq!(c2.quality_values(), Some((40, 50)));
        assert_eq!(base("X", 3).quality_values(), None);
        let c3 = Token::compose(c2, body("C"), 0, stage());
        assert_eq!(c3.quality_values(), None);
    }

    #[test]
    fn composite_owns_constituents() {
        let c = Token::compose(base("A", 1), base("B", 2), 0, stage());
        let (first, second) = c.constituents().unwrap();
        assert_eq!(first.id().as_str(), "A");
        assert_eq!(second.id().as_str(), "B");
        assert!(c.attribute().is_none());
    }

    #[test]
    fn dimensions_display() {
        assert_eq!(Dimensions::from_f64(1.5, 2.0, 0.25).unwrap().to_string(), "1.50 x 2.00 x 0.25");
    }

    #[test]
    fn dimensions_reject_unrepresentable_sides() {
        assert!(Dimensions::from_f64(1.0e10, 1.0, 1.0).is_none());
        assert!(Dimensions::from_f64(1.0, -0.5, 1.0).is_none());
        assert!(Dimensions::from_f64(1.0, 1.0, f64::NAN).is_none());
    }

    #[test]
    fn oversized_sides_saturate() {
        let wide = Dimensions::from_f64(1.5e9, 1.0, 1.0).unwrap();
        let joined = Layout::SideBySide.combine(wide, wide);
        assert_eq!(joined.width, Fixed64::MAX);
        assert_eq!(joined.height, Fixed64::ONE);

        let tall = Dimensions::from_f64(1.0, 1.5e9, 1.0).unwrap();
        assert_eq!(Layout::Stacked.combine(tall, tall).height, Fixed64::MAX);
    }
}
