// src/pages.rs
use askama::Template;

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupPage {
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub flash: Option<String>,
    pub email: String,
    pub holdings: Vec<String>,
    pub watchlist: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_is_shown_once_and_escaped() {
        let html = LoginPage {
            flash: Some("<b>Invalid email or password.</b>".into()),
        }
        .render()
        .unwrap();
        assert!(html.contains("Invalid email or password."));
        assert!(!html.contains("<b>"));

        let html = SignupPage { flash: None }.render().unwrap();
        assert!(!html.contains("bg-red-100"));
    }

    #[test]
    fn dashboard_lists_both_lists() {
        let html = DashboardPage {
            flash: None,
            email: "a@example.com".into(),
            holdings: vec!["AAPL".into()],
            watchlist: vec![],
        }
        .render()
        .unwrap();
        assert!(html.contains("Welcome, a@example.com!"));
        assert!(html.contains("AAPL"));
        assert!(html.contains("No stocks in watchlist."));
        assert!(!html.contains("No stocks in holdings."));
    }
}
