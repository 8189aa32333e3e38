use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Europe::London;
use league_clients::{Email, Identity};
use league_core::config::RealmConfig;
use league_core::{LeagueError, Registry, Result, Season, SequencedTimeFrame, TimeFrame};
use league_store::{Entry, ScoredEntryPrediction, Standings};

pub const SUBJECT_WINDOW_OPEN: &str = "Prediction Window Open!";
pub const SUBJECT_WINDOW_OPEN_LAST: &str = "Prediction Window Open (Last Chance!)";
pub const SUBJECT_WINDOW_CLOSING: &str = "Prediction Window Closing Soon!";
pub const SUBJECT_FINAL_ROUND: &str = "Final Round Complete!";

/// Renders notification emails for entrants, addressed from their realm.
pub struct Composer {
    realms: HashMap<String, RealmConfig>,
    registry: Arc<Registry>,
}

impl Composer {
    pub fn new(realms: &[RealmConfig], registry: Arc<Registry>) -> Self {
        Self {
            realms: realms.iter().map(|r| (r.name.clone(), r.clone())).collect(),
            registry,
        }
    }

    fn realm(&self, name: &str) -> Result<&RealmConfig> {
        self.realms
            .get(name)
            .ok_or_else(|| LeagueError::NotFound(format!("realm '{name}'")))
    }

    pub fn window_open(
        &self,
        entry: &Entry,
        season: &Season,
        window: &SequencedTimeFrame,
    ) -> Result<Email> {
        let realm = self.realm(&entry.realm_name)?;
        let subject = if window.is_last() {
            SUBJECT_WINDOW_OPEN_LAST
        } else {
            SUBJECT_WINDOW_OPEN
        };

        let mut body = greeting(entry);
        let _ = writeln!(
            body,
            "Prediction window {} of {} for {} is now open.\n",
            window.index, window.total, season.name
        );
        let _ = writeln!(
            body,
            "You have until {} to make any changes to your prediction:\n{}/prediction\n",
            at(window.current.until),
            realm.origin
        );
        body.push_str(&next_window_line(window));
        body.push_str(&sign_off(realm));

        Ok(envelope(realm, entry, subject, body))
    }

    pub fn window_closing(
        &self,
        entry: &Entry,
        season: &Season,
        window: &SequencedTimeFrame,
    ) -> Result<Email> {
        let realm = self.realm(&entry.realm_name)?;

        let mut body = greeting(entry);
        let _ = writeln!(
            body,
            "Prediction window {} of {} for {} closes at {}.\n",
            window.index,
            window.total,
            season.name,
            at(window.current.until)
        );
        let _ = writeln!(
            body,
            "If you'd like to change your prediction, now's the time:\n{}/prediction\n",
            realm.origin
        );
        body.push_str(&next_window_line(window));
        body.push_str(&sign_off(realm));

        Ok(envelope(realm, entry, SUBJECT_WINDOW_CLOSING, body))
    }

    /// Round summary for one scored prediction. `final_round` switches to
    /// the end-of-season wording.
    pub fn round_complete(
        &self,
        entry: &Entry,
        season: &Season,
        standings: &Standings,
        scored: &ScoredEntryPrediction,
        final_round: bool,
    ) -> Result<Email> {
        let realm = self.realm(&entry.realm_name)?;
        let subject = if final_round {
            SUBJECT_FINAL_ROUND.to_string()
        } else {
            format!("End of Round {}", standings.round_number)
        };

        let mut body = greeting(entry);
        let _ = writeln!(
            body,
            "Round {} of {} is complete.",
            standings.round_number, season.name
        );
        if final_round {
            body.push_str("That's the end of the season, thanks for playing!\n");
        }
        let _ = writeln!(
            body,
            "\nYour score for this round is {} (lower is better).\n",
            scored.score
        );

        let observed: HashMap<_, _> = standings
            .rankings
            .iter()
            .map(|r| (&r.id, r.position))
            .collect();
        body.push_str("How your prediction compares:\n");
        for ranking in &scored.rankings {
            let team = self
                .registry
                .team_by_id(&ranking.id)
                .map(|t| t.name.as_str())
                .unwrap_or(ranking.id.as_str());
            let finished = observed
                .get(&ranking.id)
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into());
            let _ = writeln!(
                body,
                "{:>3}. {:<28} finished {:>2}  (+{})",
                ranking.position, team, finished, ranking.score
            );
        }
        let _ = writeln!(body, "\nSee the full leaderboard:\n{}/leaderboard\n", realm.origin);
        body.push_str(&sign_off(realm));

        Ok(envelope(realm, entry, &subject, body))
    }
}

fn envelope(realm: &RealmConfig, entry: &Entry, subject: &str, plain_text: String) -> Email {
    Email {
        from: Identity::new(&realm.sender_name, &realm.sender_address),
        to: Identity::new(&entry.entrant_name, &entry.entrant_email),
        reply_to: Identity::new(&realm.sender_name, &realm.reply_to_address),
        subject: subject.to_string(),
        html: to_html(&plain_text),
        plain_text,
    }
}

fn greeting(entry: &Entry) -> String {
    format!("Hi {},\n\n", entry.entrant_name)
}

fn sign_off(realm: &RealmConfig) -> String {
    format!(
        "Good luck!\n{}\n\nQuestions? Just reply, or write to {}\n",
        realm.sender_name, realm.reply_to_address
    )
}

fn next_window_line(window: &SequencedTimeFrame) -> String {
    match (&window.next, window.is_last()) {
        (_, true) => "This is the last prediction window of the season.\n\n".to_string(),
        (Some(TimeFrame { from, .. }), false) => {
            format!("The next prediction window opens at {}.\n\n", at(*from))
        }
        (None, false) => String::new(),
    }
}

/// `3:04pm on Mon 2 January`, in UK local time.
pub fn at(ts: DateTime<Utc>) -> String {
    let local = ts.with_timezone(&London);
    format!("{} on {}", local.format("%-I:%M%P"), local.format("%a %-d %B"))
}

/// Plain text to minimal HTML: one paragraph per blank-line block.
fn to_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    escaped
        .split("\n\n")
        .map(str::trim_end)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", p.replace('\n', "<br>\n")))
        .collect::<Vec<_>>()
        .join("\n")
}
