pub mod health;
pub use self::health::health;

pub mod login;
pub use self::login::{classic_login, login_page};

pub mod oauth2;
pub use self::oauth2::{authorize, callback};

pub mod whoami;
pub use self::whoami::whoami;
