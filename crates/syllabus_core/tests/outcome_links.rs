use rusqlite::Connection;
use syllabus_core::db::open_db_in_memory;
use syllabus_core::{
    OutcomeRepository, OutcomeService, OutcomeServiceError, PloId, SqliteOutcomeRepository,
    SqliteSyllabusRepository, SyllabusDocument, SyllabusId, SyllabusRepository,
};
use uuid::Uuid;

fn setup() -> (Connection, SyllabusId) {
    let conn = open_db_in_memory().unwrap();
    let syllabus_id = Uuid::new_v4();
    {
        let repo = SqliteSyllabusRepository::try_new(&conn).unwrap();
        let document = SyllabusDocument::new(syllabus_id, "Intro", "syllabus_2025");
        repo.insert_document(&document).unwrap();
    }
    (conn, syllabus_id)
}

fn outcome_service(conn: &Connection) -> OutcomeService<SqliteOutcomeRepository<'_>> {
    OutcomeService::new(SqliteOutcomeRepository::try_new(conn).unwrap())
}

#[test]
fn create_objective_derives_sequential_names() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let plo = service.create_plo("PLO1", "Apply engineering knowledge").unwrap();
    let first = service
        .create_objective(syllabus_id, "Understand fundamentals", &[plo.plo_id])
        .unwrap();
    let second = service
        .create_objective(syllabus_id, "Apply fundamentals", &[])
        .unwrap();

    assert_eq!(first.name, "CO1");
    assert_eq!(second.name, "CO2");
    assert_eq!(
        service.list_targets(first.objective_id).unwrap().len(),
        1
    );
}

#[test]
fn create_child_outcome_seeds_zero_rated_bridges() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let t2 = service.create_plo("PLO2", "second").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1, t2])
        .unwrap();

    let child = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap();

    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    let bridges = repo.list_bridges(child.outcome_id).unwrap();
    assert_eq!(bridges.len(), 2);
    assert!(bridges.iter().all(|bridge| bridge.rating == 0));
}

#[test]
fn reconcile_matches_spec_scenario() {
    // Parent with children [c1, c2], current targets {t1, t2}, and bridge
    // (c1, t1) rated 4. Reconciling to {t2, t3} must keep t2 bridges,
    // delete every t1 bridge, and create zero-rated t3 bridges.
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let t2 = service.create_plo("PLO2", "second").unwrap().plo_id;
    let t3 = service.create_plo("PLO3", "third").unwrap().plo_id;

    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1, t2])
        .unwrap();
    let c1 = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap()
        .outcome_id;
    let c2 = service
        .create_child_outcome(objective.objective_id, "Outcome 2")
        .unwrap()
        .outcome_id;
    service.set_rating(c1, t1, 4).unwrap();

    let delta = service
        .reconcile_targets(objective.objective_id, &[t2, t3])
        .unwrap();
    assert_eq!(delta.added, vec![t3]);
    assert_eq!(delta.removed, vec![t1]);

    let targets = service.list_targets(objective.objective_id).unwrap();
    assert_eq!(targets.into_iter().collect::<Vec<_>>(), sorted(vec![t2, t3]));

    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    for child in [c1, c2] {
        assert_eq!(repo.get_rating(child, t1).unwrap(), None);
        assert_eq!(repo.get_rating(child, t2).unwrap(), Some(0));
        assert_eq!(repo.get_rating(child, t3).unwrap(), Some(0));
    }
}

#[test]
fn retained_target_keeps_its_rating_across_reconciles() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let t2 = service.create_plo("PLO2", "second").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1])
        .unwrap();
    let child = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap()
        .outcome_id;
    service.set_rating(child, t1, 5).unwrap();

    service
        .reconcile_targets(objective.objective_id, &[t1, t2])
        .unwrap();
    service
        .reconcile_targets(objective.objective_id, &[t1, t2])
        .unwrap();

    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    assert_eq!(repo.get_rating(child, t1).unwrap(), Some(5));
    assert_eq!(repo.get_rating(child, t2).unwrap(), Some(0));
}

#[test]
fn adopting_a_target_keeps_preexisting_child_bridge_rating() {
    // The child already carries a rated bridge to a target the parent only
    // now formally adopts; the idempotent insert must not reset it.
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let t2 = service.create_plo("PLO2", "second").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1])
        .unwrap();
    let child = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap()
        .outcome_id;
    service.set_rating(child, t2, 3).unwrap();

    service
        .reconcile_targets(objective.objective_id, &[t1, t2])
        .unwrap();

    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    assert_eq!(repo.get_rating(child, t2).unwrap(), Some(3));
}

#[test]
fn empty_desired_set_clears_memberships_and_bridges() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let t2 = service.create_plo("PLO2", "second").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1, t2])
        .unwrap();
    let child = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap()
        .outcome_id;

    let delta = service
        .reconcile_targets(objective.objective_id, &[])
        .unwrap();
    assert!(delta.added.is_empty());
    assert_eq!(delta.removed, sorted(vec![t1, t2]));

    assert!(service.list_targets(objective.objective_id).unwrap().is_empty());
    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    assert!(repo.list_bridges(child).unwrap().is_empty());
}

#[test]
fn unknown_target_rejects_whole_reconciliation() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1])
        .unwrap();
    let unknown = Uuid::new_v4();

    let err = service
        .reconcile_targets(objective.objective_id, &[t1, unknown])
        .unwrap_err();
    assert!(matches!(
        err,
        OutcomeServiceError::PloNotFound(id) if id == unknown
    ));

    // No partial membership change happened.
    let targets = service.list_targets(objective.objective_id).unwrap();
    assert_eq!(targets.into_iter().collect::<Vec<_>>(), vec![t1]);
}

#[test]
fn reconcile_with_current_set_is_a_noop() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1])
        .unwrap();

    let delta = service
        .reconcile_targets(objective.objective_id, &[t1])
        .unwrap();
    assert!(delta.is_empty());
}

#[test]
fn set_rating_upserts_and_rejects_negative_values() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[])
        .unwrap();
    let child = service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap()
        .outcome_id;

    // No bridge exists yet (the parent never targeted t1): upsert creates it.
    service.set_rating(child, t1, 2).unwrap();
    service.set_rating(child, t1, 4).unwrap();

    let repo = SqliteOutcomeRepository::try_new(&conn).unwrap();
    assert_eq!(repo.get_rating(child, t1).unwrap(), Some(4));

    let err = service.set_rating(child, t1, -1).unwrap_err();
    assert!(matches!(err, OutcomeServiceError::InvalidRating(-1)));

    let err = service.set_rating(Uuid::new_v4(), t1, 1).unwrap_err();
    assert!(matches!(err, OutcomeServiceError::OutcomeNotFound(_)));
}

#[test]
fn delete_objective_cascades_to_children_bridges_and_memberships() {
    let (conn, syllabus_id) = setup();
    let service = outcome_service(&conn);

    let t1 = service.create_plo("PLO1", "first").unwrap().plo_id;
    let objective = service
        .create_objective(syllabus_id, "Objective", &[t1])
        .unwrap();
    service
        .create_child_outcome(objective.objective_id, "Outcome 1")
        .unwrap();
    service
        .create_child_outcome(objective.objective_id, "Outcome 2")
        .unwrap();

    service.delete_objective(objective.objective_id).unwrap();

    for table in ["course_objective", "course_learning_outcome", "objective_plo", "clo_plo_association"] {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "table {table} should be empty");
    }

    // Reference data is untouched.
    let plo_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM programme_learning_outcome;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(plo_count, 1);
}

fn sorted(mut ids: Vec<PloId>) -> Vec<PloId> {
    ids.sort();
    ids
}
