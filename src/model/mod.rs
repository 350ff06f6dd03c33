mod ids;
mod post;
mod report;
mod session;

pub use self::ids::{MediaId, PostId, UserId};
pub use self::post::{
    Author, Post, PostKind, PostPatch, PostStatus, ServerCopy, Vote, VoteDirection,
};
pub use self::report::Report;
pub use self::session::{Actor, BearerToken, Role, Session};
