//! Geometry relations. The server does all the math.

use crate::reql::ast::Term;
use crate::reql::terms::TermType;

impl Term {
    pub fn distance<G: Into<Term>>(&self, other: G) -> Term {
        self.chain1(TermType::Distance, other)
    }

    pub fn intersects<G: Into<Term>>(&self, other: G) -> Term {
        self.chain1(TermType::Intersects, other)
    }

    pub fn includes<G: Into<Term>>(&self, other: G) -> Term {
        self.chain1(TermType::Includes, other)
    }

    pub fn fill(&self) -> Term {
        self.chain(TermType::Fill)
    }

    pub fn to_geojson(&self) -> Term {
        self.chain(TermType::ToGeojson)
    }

    pub fn polygon_sub<G: Into<Term>>(&self, hole: G) -> Term {
        self.chain1(TermType::PolygonSub, hole)
    }

    /// Rows whose geo index intersects `geometry`; needs an `index` option
    pub fn get_intersecting<G: Into<Term>>(&self, geometry: G) -> Term {
        self.chain1(TermType::GetIntersecting, geometry)
    }

    /// Rows closest to `point`; needs an `index` option
    pub fn get_nearest<G: Into<Term>>(&self, point: G) -> Term {
        self.chain1(TermType::GetNearest, point)
    }
}
