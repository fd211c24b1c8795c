use std::{sync::Arc, time::Duration};

use timestudy::{open_workbench, NoticeKind, NoticeLog, ReadingForm, SequenceState, TimerStatus};

#[tokio::test]
async fn assembly_line_sequence_records_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let notices = Arc::new(NoticeLog::new());
    let bench = open_workbench(dir.path(), notices.clone()).unwrap();

    let store = bench.store().clone();
    let created = store.create_process("Assembly").await.unwrap();
    for name in ["Pick", "Place", "Fasten"] {
        store.add_subprocess(&created.id, name).await.unwrap();
    }
    let process = bench.open_process(&created.id).await.unwrap();
    let pick = process.timer_key(0).unwrap();
    let place = process.timer_key(1).unwrap();
    let fasten = process.timer_key(2).unwrap();
    let form = ReadingForm::default();

    let change = bench.set_sequence(&process, true).await;
    assert_eq!(change.state, SequenceState::at(0));

    bench.start(&pick).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let first = bench.advance(&process, &form).await.unwrap();

    let reading = first.reading().unwrap();
    assert!(
        (1_450..=1_600).contains(&reading.elapsed_ms),
        "first step took {}ms",
        reading.elapsed_ms
    );
    assert_eq!(first.current_index, 1);
    assert_eq!(bench.engine().status(&place).await, TimerStatus::Running);
    assert_eq!(bench.engine().status(&pick).await, TimerStatus::Paused);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    let second = bench.advance(&process, &form).await.unwrap();

    let reading = second.reading().unwrap();
    assert!(
        (950..=1_100).contains(&reading.elapsed_ms),
        "second step took {}ms",
        reading.elapsed_ms
    );
    assert_eq!(second.current_index, 2);
    assert!(bench.engine().is_running(&fasten).await);

    let third = bench.advance(&process, &form).await.unwrap();
    assert_eq!(third.current_index, 0);
    assert!(bench.engine().is_running(&pick).await);
    assert_eq!(bench.engine().running_keys(&process.id).await, vec![pick]);

    let stored = store.list_readings(&process.id).await.unwrap();
    let steps: Vec<_> = stored.iter().map(|r| r.subprocess_id.as_str()).collect();
    assert_eq!(
        steps,
        [
            process.subprocesses[0].id.as_str(),
            process.subprocesses[1].id.as_str(),
            process.subprocesses[2].id.as_str(),
        ]
    );
    assert!(stored.iter().all(|r| r.reading.should_persist));

    let reopened = store.get_process(&process.id).await.unwrap();
    assert_eq!(reopened.sequence, SequenceState::at(0));
    assert!(notices
        .take()
        .iter()
        .all(|notice| notice.kind != NoticeKind::Error));
}

#[tokio::test]
async fn disabling_sequence_stops_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let bench = open_workbench(dir.path(), Arc::new(NoticeLog::new())).unwrap();

    let store = bench.store().clone();
    let created = store.create_process("Packing").await.unwrap();
    store.add_subprocess(&created.id, "Fold").await.unwrap();
    store.add_subprocess(&created.id, "Seal").await.unwrap();
    let process = bench.open_process(&created.id).await.unwrap();

    bench.set_sequence(&process, true).await;
    bench.advance(&process, &ReadingForm::default()).await.unwrap();
    assert_eq!(bench.engine().running_keys(&process.id).await.len(), 1);

    let change = bench.set_sequence(&process, false).await;
    assert_eq!(change.state, SequenceState::disabled());
    assert_eq!(change.stopped, 1);
    assert!(bench.engine().running_keys(&process.id).await.is_empty());
    assert!(bench
        .advance(&process, &ReadingForm::default())
        .await
        .is_err());
}
