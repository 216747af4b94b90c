//! End-to-end flows through the engine against the in-memory store.

mod common;

use apcore::{
    EngineError, InstanceState, QueryService, TaskActor, TaskKind, TaskService, TaskState,
    Variables,
};
use common::{active_tasks, actor_ids, setup, sole_task, task_of, vars};
use serde_json::json;

const LINEAR: &str = r#"{
    "name": "leave",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "approve",
            "nodeType": "APPROVER",
            "nodeUserList": [{"id": "u1", "name": "Manager"}]
        }
    }
}"#;

const CONDITION: &str = r#"{
    "name": "expense",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "route",
            "nodeType": "CONDITION",
            "conditionNodes": [
                {
                    "expression": "amount > 1000",
                    "priority": 1,
                    "childNode": {
                        "nodeName": "manager",
                        "nodeType": "APPROVER",
                        "nodeUserList": [{"id": "m1", "name": "Manager"}]
                    }
                },
                {
                    "priority": 2,
                    "childNode": {
                        "nodeName": "lead",
                        "nodeType": "APPROVER",
                        "nodeUserList": [{"id": "l1", "name": "Lead"}]
                    }
                }
            ],
            "childNode": {
                "nodeName": "finance",
                "nodeType": "APPROVER",
                "nodeUserList": [{"id": "f1", "name": "Finance"}]
            }
        }
    }
}"#;

const COUNTERSIGN: &str = r#"{
    "name": "contract",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "sign",
            "nodeType": "APPROVER",
            "performType": "COUNTERSIGN",
            "nodeUserList": [
                {"id": "u1", "name": "One"},
                {"id": "u2", "name": "Two"},
                {"id": "u3", "name": "Three"}
            ]
        }
    }
}"#;

const VOTE: &str = r#"{
    "name": "budget",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "vote",
            "nodeType": "APPROVER",
            "performType": "VOTE_SIGN",
            "passWeight": 60,
            "nodeUserList": [
                {"id": "u1", "name": "One", "weight": 40},
                {"id": "u2", "name": "Two", "weight": 30},
                {"id": "u3", "name": "Three", "weight": 30}
            ]
        }
    }
}"#;

const SORT: &str = r#"{
    "name": "review",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "seq",
            "nodeType": "APPROVER",
            "performType": "SORT",
            "nodeUserList": [
                {"id": "u1", "name": "One"},
                {"id": "u2", "name": "Two"},
                {"id": "u3", "name": "Three"}
            ]
        }
    }
}"#;

const CARBON_COPY: &str = r#"{
    "name": "notice",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "notify",
            "nodeType": "CC",
            "nodeUserList": [{"id": "cc1", "name": "Watcher"}],
            "childNode": {
                "nodeName": "approve",
                "nodeType": "APPROVER",
                "nodeUserList": [{"id": "u1", "name": "Manager"}]
            }
        }
    }
}"#;

const JUMP: &str = r#"{
    "name": "chain",
    "nodeConfig": {
        "nodeName": "start",
        "nodeType": "INITIATOR",
        "nodeUserList": [{"id": "u0", "name": "Applicant"}],
        "childNode": {
            "nodeName": "a",
            "nodeType": "APPROVER",
            "nodeUserList": [{"id": "u1", "name": "One"}],
            "childNode": {
                "nodeName": "b",
                "nodeType": "APPROVER",
                "nodeUserList": [{"id": "u2", "name": "Two"}]
            }
        }
    }
}"#;

#[test]
fn linear_flow_runs_to_completion() {
    let (engine, store, pid) = setup(LINEAR);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    assert_eq!(start.task_name, "start");
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    let approve = sole_task(&engine, &iid);
    assert_eq!(approve.task_name, "approve");
    assert_eq!(actor_ids(&engine, &approve.task_id), vec!["u1"]);
    engine
        .execute_task(&approve.task_id, "u1", Variables::new())
        .unwrap();

    assert!(engine.context().query_service.instance(&iid).unwrap().is_none());
    let closed = store.closed_instance(&iid).unwrap();
    assert_eq!(closed.state, InstanceState::Completed);
}

#[test]
fn condition_routes_high_amount_and_converges() {
    let (engine, store, pid) = setup(CONDITION);
    let instance = engine
        .start_instance_by_id(&pid, "u0", vars(&[("amount", json!(5000))]))
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    let manager = sole_task(&engine, &iid);
    assert_eq!(manager.task_name, "manager");

    // Leaving the branch converges on the condition's straight-through child.
    engine
        .execute_task(&manager.task_id, "m1", Variables::new())
        .unwrap();
    let finance = sole_task(&engine, &iid);
    assert_eq!(finance.task_name, "finance");

    engine
        .execute_task(&finance.task_id, "f1", Variables::new())
        .unwrap();
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn condition_falls_back_to_unguarded_branch() {
    let (engine, _store, pid) = setup(CONDITION);
    let instance = engine
        .start_instance_by_id(&pid, "u0", vars(&[("amount", json!(200))]))
        .unwrap();

    let start = sole_task(&engine, &instance.instance_id);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    let lead = sole_task(&engine, &instance.instance_id);
    assert_eq!(lead.task_name, "lead");
}

#[test]
fn condition_requires_variables() {
    let (engine, _store, pid) = setup(CONDITION);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let start = sole_task(&engine, &instance.instance_id);
    let err = engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn condition_without_matching_branch_fails() {
    let doc = r#"{
        "name": "strict",
        "nodeConfig": {
            "nodeName": "start",
            "nodeType": "INITIATOR",
            "nodeUserList": [{"id": "u0", "name": "Applicant"}],
            "childNode": {
                "nodeName": "route",
                "nodeType": "CONDITION",
                "conditionNodes": [
                    {
                        "expression": "amount > 1000",
                        "priority": 1,
                        "childNode": {
                            "nodeName": "manager",
                            "nodeType": "APPROVER",
                            "nodeUserList": [{"id": "m1", "name": "Manager"}]
                        }
                    }
                ]
            }
        }
    }"#;
    let (engine, _store, pid) = setup(doc);
    let instance = engine
        .start_instance_by_id(&pid, "u0", vars(&[("amount", json!(10))]))
        .unwrap();
    let start = sole_task(&engine, &instance.instance_id);
    let err = engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[test]
fn countersign_waits_for_every_actor() {
    let (engine, store, pid) = setup(COUNTERSIGN);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    assert_eq!(active_tasks(&engine, &iid).len(), 3);

    for actor in ["u1", "u2"] {
        let task = task_of(&engine, &iid, actor);
        engine
            .execute_task(&task.task_id, actor, Variables::new())
            .unwrap();
        assert!(engine.context().query_service.instance(&iid).unwrap().is_some());
    }
    assert_eq!(active_tasks(&engine, &iid).len(), 1);

    let last = task_of(&engine, &iid, "u3");
    engine
        .execute_task(&last.task_id, "u3", Variables::new())
        .unwrap();
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn vote_sign_advances_once_threshold_reached() {
    let (engine, store, pid) = setup(VOTE);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    assert_eq!(active_tasks(&engine, &iid).len(), 3);
    let straggler = task_of(&engine, &iid, "u3");

    // 40 of 100 approved, threshold is 60: stage keeps waiting.
    let first = task_of(&engine, &iid, "u1");
    engine
        .execute_task(&first.task_id, "u1", Variables::new())
        .unwrap();
    assert_eq!(active_tasks(&engine, &iid).len(), 2);
    assert!(engine.context().query_service.instance(&iid).unwrap().is_some());

    // 70 of 100 approved: remaining votes no longer matter.
    let second = task_of(&engine, &iid, "u2");
    engine
        .execute_task(&second.task_id, "u2", Variables::new())
        .unwrap();
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
    assert_eq!(
        store.closed_task(&straggler.task_id).unwrap().state,
        TaskState::Terminated
    );
}

#[test]
fn sort_actors_act_in_declared_order() {
    let (engine, store, pid) = setup(SORT);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    for actor in ["u1", "u2", "u3"] {
        let task = sole_task(&engine, &iid);
        assert_eq!(task.task_name, "seq");
        assert_eq!(actor_ids(&engine, &task.task_id), vec![actor]);
        engine
            .execute_task(&task.task_id, actor, Variables::new())
            .unwrap();
    }
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn sort_without_declared_users_follows_resolver_order() {
    use apcore::{Execution, Node, TaskActorResolver};
    use std::sync::Arc;

    struct Roster;
    impl TaskActorResolver for Roster {
        fn list_task_actors(&self, node: &Node, _execution: &Execution) -> Vec<TaskActor> {
            if node.name == "seq" {
                vec![TaskActor::user("r1", "R1"), TaskActor::user("r2", "R2")]
            } else {
                Vec::new()
            }
        }
    }

    let doc = r#"{
        "name": "review",
        "nodeConfig": {
            "nodeName": "start",
            "nodeType": "INITIATOR",
            "childNode": {
                "nodeName": "seq",
                "nodeType": "APPROVER",
                "performType": "SORT"
            }
        }
    }"#;
    let (engine, store, pid) = setup(doc);
    let ctx = engine.context().clone().with_actor_resolver(Arc::new(Roster));
    let engine = apruntime::ProcessEngine::new(ctx);

    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();
    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    for actor in ["r1", "r2"] {
        let task = sole_task(&engine, &iid);
        assert_eq!(actor_ids(&engine, &task.task_id), vec![actor]);
        engine
            .execute_task(&task.task_id, actor, Variables::new())
            .unwrap();
    }
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn sort_transfer_outside_sequence_falls_through() {
    let (engine, store, pid) = setup(SORT);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    let task = sole_task(&engine, &iid);
    engine
        .context()
        .task_service
        .transfer_task(&task.task_id, "u1", &TaskActor::user("x9", "Nine"))
        .unwrap();
    let task = sole_task(&engine, &iid);
    assert_eq!(task.kind, TaskKind::Transfer);
    assert_eq!(task.assignor_id.as_deref(), Some("u1"));
    assert_eq!(actor_ids(&engine, &task.task_id), vec!["x9"]);

    // The transferee is not in the declared sequence, so completion
    // routes past the remaining declared actors.
    engine
        .execute_task(&task.task_id, "x9", Variables::new())
        .unwrap();
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn carbon_copy_records_and_never_waits() {
    let (engine, store, pid) = setup(CARBON_COPY);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    let approve = sole_task(&engine, &iid);
    assert_eq!(approve.task_name, "approve");
    let cc = store
        .closed_tasks_by_instance_id(&iid)
        .into_iter()
        .find(|t| t.kind == TaskKind::Cc)
        .unwrap();
    assert_eq!(cc.task_name, "notify");
    assert_eq!(cc.state, TaskState::Completed);
}

#[test]
fn jump_creates_successor_at_named_node() {
    let (engine, store, pid) = setup(JUMP);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    let a = sole_task(&engine, &iid);
    engine
        .execute_and_jump_task(&a.task_id, "b", "u1", Variables::new())
        .unwrap();
    let b = sole_task(&engine, &iid);
    assert_eq!(b.task_name, "b");
    assert_eq!(actor_ids(&engine, &b.task_id), vec!["u2"]);

    engine
        .execute_task(&b.task_id, "u2", Variables::new())
        .unwrap();
    assert_eq!(
        store.closed_instance(&iid).unwrap().state,
        InstanceState::Completed
    );
}

#[test]
fn jump_back_reopens_an_earlier_stage() {
    let (engine, _store, pid) = setup(JUMP);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();

    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    let a = sole_task(&engine, &iid);
    engine
        .execute_task(&a.task_id, "u1", Variables::new())
        .unwrap();

    let b = sole_task(&engine, &iid);
    engine
        .execute_and_jump_task(&b.task_id, "a", "u2", Variables::new())
        .unwrap();
    let reopened = sole_task(&engine, &iid);
    assert_eq!(reopened.task_name, "a");
    assert_eq!(actor_ids(&engine, &reopened.task_id), vec!["u1"]);
}

#[test]
fn completing_a_task_twice_fails() {
    let (engine, _store, pid) = setup(LINEAR);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let start = sole_task(&engine, &instance.instance_id);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();
    let err = engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[test]
fn operator_outside_actor_list_is_rejected() {
    let (engine, _store, pid) = setup(LINEAR);
    let instance = engine
        .start_instance_by_id(&pid, "u0", Variables::new())
        .unwrap();
    let iid = instance.instance_id.clone();
    let start = sole_task(&engine, &iid);
    engine
        .execute_task(&start.task_id, "u0", Variables::new())
        .unwrap();

    let approve = sole_task(&engine, &iid);
    let err = engine
        .execute_task(&approve.task_id, "zz", Variables::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    // The failed call left the task untouched.
    assert_eq!(sole_task(&engine, &iid).task_id, approve.task_id);
}

#[test]
fn starting_an_unknown_process_fails() {
    let (engine, _store) = apmem::memory_engine();
    let err = engine
        .start_instance_by_id("missing", "u0", Variables::new())
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
