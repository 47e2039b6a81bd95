//! Entity Model (spec §4.B): record types and their key derivations,
//! serialization to/from store attribute maps, and the composite-string
//! field codecs in `keys`.

pub mod bot;
pub mod email;
pub mod folder;
pub mod invite;
pub mod keys;
pub mod linked_account;
pub mod login_request;
pub mod message;
pub mod message_file;
pub mod subscription;
pub mod tel;
pub mod token;
pub mod user;
pub mod user_perm;
pub mod wsconn;

pub use bot::Bot;
pub use email::Email;
pub use folder::{Folder, FolderKind};
pub use invite::Invite;
pub use linked_account::LinkedAccount;
pub use login_request::LoginRequest;
pub use message::{Message, MessageKind};
pub use message_file::MessageFile;
pub use subscription::{SubscriptionA, SubscriptionB};
pub use tel::Tel;
pub use token::Token;
pub use user::User;
pub use user_perm::UserPerm;
pub use wsconn::WsConn;
