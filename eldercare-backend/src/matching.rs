//! Pairing help requests with people nearby

use rusqlite::Result as SqliteResult;

use crate::db::Database;
use crate::models::{NearbyTask, Task, VolunteerMatch};
use crate::proximity::{match_score, rank_for_mode, rank_within_radius, GeoPoint, MatchMode};

/// Most tasks returned by a nearby search
pub const NEARBY_TASK_LIMIT: usize = 50;

/// Located accounts around `reference`, nearest first, scored.
/// The requester (`exclude`) is never matched with themselves.
pub fn match_volunteers(
    db: &Database,
    reference: GeoPoint,
    exclude: i64,
    mode: MatchMode,
) -> SqliteResult<Vec<VolunteerMatch>> {
    let candidates = db.list_located_accounts(exclude)?;

    let matches = rank_for_mode(reference, candidates, mode)
        .into_iter()
        .map(|ranked| VolunteerMatch {
            account: ranked.item.to_profile(),
            distance: ranked.distance,
            match_score: match_score(ranked.distance),
        })
        .collect();
    Ok(matches)
}

/// Tasks strictly inside `radius_m`, emergencies first, then by distance
pub fn nearby_tasks(reference: GeoPoint, tasks: Vec<Task>, radius_m: f64) -> Vec<NearbyTask> {
    let mut nearby: Vec<NearbyTask> = rank_within_radius(reference, tasks, radius_m, usize::MAX)
        .into_iter()
        .map(|ranked| NearbyTask {
            is_emergency: ranked.item.is_emergency(),
            task: ranked.item,
            distance: ranked.distance,
        })
        .collect();

    // Stable, so distance order holds within each group
    nearby.sort_by_key(|t| !t.is_emergency);
    nearby.truncate(NEARBY_TASK_LIMIT);
    nearby
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now_utc;
    use crate::models::{AccountRole, NewAccount, Sex, TaskStatus, EMERGENCY_CATEGORY};

    fn place(db: &Database, phone: &str, lat: f64, lng: f64) -> i64 {
        let account = db
            .create_account(&NewAccount {
                nickname: format!("user {}", phone),
                phone: phone.to_string(),
                sex: Sex::Man,
                age: 40,
                role: AccountRole::Volunteer,
                avatar: String::new(),
            })
            .unwrap();
        db.conn()
            .execute(
                "UPDATE accounts SET latitude = ?1, longitude = ?2 WHERE id = ?3",
                rusqlite::params![lat, lng, account.id],
            )
            .unwrap();
        account.id
    }

    fn task(id: i64, category: &str, lat: f64, lng: f64) -> Task {
        Task {
            id,
            creator_id: 1,
            assignee_id: None,
            title: "help".into(),
            description: String::new(),
            category: category.into(),
            status: TaskStatus::Pending,
            reward: 0.0,
            latitude: lat,
            longitude: lng,
            address: String::new(),
            deadline: None,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    #[test]
    fn test_match_volunteers_ranks_and_scores() {
        let db = Database::new(":memory:").unwrap();
        let requester = place(&db, "10001", 0.0, 0.0);
        let near = place(&db, "10002", 0.0, 0.01);
        place(&db, "10003", 0.0, 0.05);
        let nearest = place(&db, "10004", 0.0, 0.001);

        let matches = match_volunteers(&db, GeoPoint::new(0.0, 0.0), requester, MatchMode::Routine).unwrap();

        let ids: Vec<i64> = matches.iter().map(|m| m.account.id).collect();
        assert_eq!(ids, vec![nearest, near]);
        assert_eq!(matches[1].match_score.round(), 78.0);
        assert!(matches[0].match_score > matches[1].match_score);
    }

    #[test]
    fn test_emergency_mode_is_tighter() {
        let db = Database::new(":memory:").unwrap();
        // ~2.2 km and ~3.3 km east of the origin
        let inside = place(&db, "10002", 0.0, 0.02);
        place(&db, "10003", 0.0, 0.03);

        let matches = match_volunteers(&db, GeoPoint::new(0.0, 0.0), 0, MatchMode::Emergency).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].account.id, inside);
    }

    #[test]
    fn test_nearby_tasks_put_emergencies_first() {
        let tasks = vec![
            task(1, "other", 0.0, 0.001),
            task(2, EMERGENCY_CATEGORY, 0.0, 0.02),
            task(3, "other", 0.0, 0.01),
            task(4, EMERGENCY_CATEGORY, 0.0, 0.005),
            task(5, "other", 0.0, 0.2),
        ];

        let nearby = nearby_tasks(GeoPoint::new(0.0, 0.0), tasks, 5_000.0);
        let ids: Vec<i64> = nearby.iter().map(|t| t.task.id).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
        assert!(nearby[0].is_emergency && !nearby[2].is_emergency);
    }

    #[test]
    fn test_nearby_tasks_are_capped() {
        let tasks = (1..=60).map(|i| task(i, "other", 0.0, 0.0001 * i as f64)).collect();
        let nearby = nearby_tasks(GeoPoint::new(0.0, 0.0), tasks, 5_000.0);
        assert_eq!(nearby.len(), NEARBY_TASK_LIMIT);
        assert_eq!(nearby[0].task.id, 1);
    }
}
