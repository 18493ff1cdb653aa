use super::*;

#[test]
fn cancelled_timers_never_fire_through_the_harness() -> Result<()> {
    let mut h = Harness::new();
    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    let handle = h.set_timeout(50, move |_| {
        *counter.borrow_mut() += 1;
        Ok(())
    });
    assert_eq!(h.timer_state(handle), Some(TimerState::Pending));
    assert!(h.clear_timeout(handle));
    h.advance(1_000)?;
    assert_eq!(*hits.borrow(), 0);
    assert_eq!(h.timer_state(handle), Some(TimerState::Cancelled));
    assert!(!h.clear_timeout(handle));
    Ok(())
}

#[test]
fn pending_timers_are_listed_in_firing_order() -> Result<()> {
    let mut h = Harness::new();
    let late = h.set_timeout(30, |_| Ok(()));
    let early = h.set_timeout(10, |_| Ok(()));
    let tie = h.set_timeout(10, |_| Ok(()));
    let handles = h
        .pending_timers()
        .into_iter()
        .map(|timer| timer.handle)
        .collect::<Vec<_>>();
    assert_eq!(handles, vec![early, tie, late]);

    assert_eq!(h.advance_to(10)?, 2);
    assert_eq!(h.pending_timers().len(), 1);
    assert_eq!(h.clear_all_timers(), 1);
    assert_eq!(h.timer_state(late), Some(TimerState::Cancelled));
    Ok(())
}

#[test]
fn timer_callback_errors_propagate_out_of_advance() -> Result<()> {
    let mut h = Harness::new();
    h.set_timeout(5, |_| Err(Error::Collaborator("fallo".into())));
    let after = h.set_timeout(6, |_| Ok(()));
    assert_eq!(h.advance(10), Err(Error::Collaborator("fallo".into())));
    assert_eq!(h.timer_state(after), Some(TimerState::Pending));
    Ok(())
}

#[test]
fn step_limit_bounds_a_single_advance() -> Result<()> {
    fn again(h: &mut Harness) -> Result<()> {
        h.set_timeout(0, again);
        Ok(())
    }

    let mut h = Harness::new();
    h.set_timer_step_limit(25)?;
    h.set_timeout(0, again);
    assert!(matches!(
        h.advance(0),
        Err(Error::ClockStarvation { steps: 25, .. })
    ));
    assert!(matches!(
        h.set_timer_step_limit(0),
        Err(Error::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn network_latency_is_configurable() -> Result<()> {
    let config = HarnessConfig {
        network_latency_ms: 5,
        ..HarnessConfig::default()
    };
    let mut h = Harness::with_fixture_and_config(config)?;
    let form = ProductForm::new();
    form.mount(&mut h)?;
    h.type_text("#nombre", "Rápido")?;
    h.click("#guardar")?;

    // POST answer at 5, reload answer at 10
    h.advance(9)?;
    h.assert_text("#message", "Producto guardado correctamente")?;
    h.assert_row_count(PRODUCT_ROWS_SELECTOR, 0)?;
    h.advance(1)?;
    h.assert_row_count(PRODUCT_ROWS_SELECTOR, 1)?;

    h.set_network_latency_ms(0);
    form.cargar_productos(&mut h)?;
    assert_eq!(h.pending_timers()[0].due_at, h.now_ms());
    Ok(())
}

#[test]
fn fetch_calls_capture_each_crud_request() -> Result<()> {
    let (mut h, _form) = mounted_form()?;
    h.type_text("#nombre", "Uno")?;
    h.type_text("#precio", "1")?;
    h.click("#guardar")?;
    h.advance(800)?;

    let rows = h.dom().rows()?;
    let buttons = row_buttons(&h, rows[0])?;
    h.click_element(buttons[0])?;
    h.click("#guardar")?;
    h.advance(800)?;

    let rows = h.dom().rows()?;
    let buttons = row_buttons(&h, rows[0])?;
    h.enqueue_confirm_response(true);
    h.click_element(buttons[1])?;
    h.advance(800)?;

    let calls = h
        .take_fetch_calls()
        .iter()
        .map(FetchRequest::to_string)
        .collect::<Vec<_>>();
    assert_eq!(
        calls,
        vec![
            "GET /productos",
            "POST /productos",
            "GET /productos",
            "PUT /productos/1",
            "GET /productos",
            "DELETE /productos/1",
            "GET /productos",
        ]
    );
    assert!(h.pending_timers().is_empty());
    Ok(())
}

#[test]
fn trace_log_is_a_bounded_ring() -> Result<()> {
    let mut h = Harness::with_fixture()?;
    h.enable_trace(true);
    h.set_trace_log_limit(2)?;
    for _ in 0..3 {
        h.dispatch("#nombre", "focus")?;
    }
    h.click("#guardar")?;
    let logs = h.take_trace_logs();
    assert_eq!(
        logs,
        vec![
            "[event] focus target=input#nombre listeners=0",
            "[event] click target=button#guardar listeners=0",
        ]
    );

    h.set_trace_events(false);
    h.click("#guardar")?;
    assert!(h.take_trace_logs().is_empty());
    Ok(())
}

#[test]
fn trace_follows_a_save_round_trip() -> Result<()> {
    let (mut h, _form) = mounted_form()?;
    h.enable_trace(true);
    h.type_text("#nombre", "Traza")?;
    h.click("#guardar")?;
    h.advance(800)?;

    let logs = h.take_trace_logs();
    assert!(logs.contains(&"[event] click target=button#guardar listeners=1".to_string()));
    assert!(logs.contains(&"[fetch] POST /productos status=200".to_string()));
    assert!(logs.iter().any(|line| line.starts_with("[timer] fire ") && line.ends_with("now_ms=100")));
    assert!(logs.iter().any(|line| line.starts_with("[timer] advance delta_ms=800")));
    Ok(())
}
