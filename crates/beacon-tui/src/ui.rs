//! UI rendering module

use beacon_core::logging::LogLevel;
use beacon_core::{BeaconService, RowStyle, ScanState, format_timestamp};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, Tab};

pub fn draw<S: BeaconService>(frame: &mut Frame, app: &mut App<S>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    match app.tab {
        Tab::Beacons => draw_beacons_tab(frame, app, chunks[1]),
        Tab::Log => draw_log_tab(frame, app, chunks[1]),
    }
    draw_status_bar(frame, app, chunks[2]);

    if let Some(toast) = &app.toast {
        draw_toast(frame, &toast.message);
    }
    if app.show_perm_warning {
        draw_permission_popup(frame, &app.perm_message);
    }
}

fn draw_header<S: BeaconService>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let titles = vec!["信标 [1]", "日志 [2]"];
    let selected = match app.tab {
        Tab::Beacons => 0,
        Tab::Log => 1,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" iBeacon Scanner "),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_beacons_tab<S: BeaconService>(frame: &mut Frame, app: &mut App<S>, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    let items: Vec<ListItem> = app
        .rows()
        .iter()
        .map(|row| ListItem::new(row.clone()))
        .collect();

    let title = match app.state() {
        ScanState::BoundScanning => " 📡 扫描中... ".to_string(),
        _ => format!(" 📋 信标记录 ({}) ", app.rows().len()),
    };

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    frame.render_stateful_widget(list, chunks[0], &mut app.list_state);

    let style = match app.row_style() {
        RowStyle::Timestamped => "距离 + 时间",
        RowStyle::RawPower => "发射功率 + 原始距离",
    };
    let info = format!(
        "区域: {}\n状态: {}\n行格式: {}\n\n\
         s 开始扫描\nx 停止扫描\nr 清空列表\n↑/↓ 浏览\nEnd 跟随最新\nTab 切换标签\nq 退出",
        app.session().region(),
        app.state(),
        style,
    );

    let help = Paragraph::new(info)
        .block(Block::default().borders(Borders::ALL).title(" 帮助 "))
        .wrap(Wrap { trim: true });

    frame.render_widget(help, chunks[1]);
}

fn draw_log_tab<S: BeaconService>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let capacity = area.height.saturating_sub(2) as usize;
    let mut items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(capacity)
        .map(|entry| {
            let color = match entry.level {
                LogLevel::Error => Color::Red,
                LogLevel::Warn => Color::Yellow,
                LogLevel::Info => Color::White,
                LogLevel::Debug | LogLevel::Trace => Color::DarkGray,
            };
            let time = format_timestamp(entry.timestamp);
            ListItem::new(format!(
                "{} {} {}",
                time,
                entry.level.icon(),
                entry.message
            ))
            .style(Style::default().fg(color))
        })
        .collect();
    items.reverse();

    let title = format!(" 📋 日志 [{}] (d 切换详细, c 清空) ", app.log_level);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_status_bar<S: BeaconService>(frame: &mut Frame, app: &App<S>, area: Rect) {
    let mode_text = match app.state() {
        ScanState::Unbound => " ⏹️  未绑定 ",
        ScanState::BoundIdle => " ⏸️  空闲 ",
        ScanState::BoundScanning => " 📡 扫描中 ",
    };

    let status = Paragraph::new(format!(
        "{}│ 记录: {} │ [s]开始 [x]停止 [r]清空 [Tab]切换 [q]退出",
        mode_text,
        app.rows().len()
    ))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_toast(frame: &mut Frame, message: &str) {
    let area = frame.area();
    let width = (message.chars().count() as u16 + 4).min(area.width);
    let rect = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.bottom().saturating_sub(7),
        width,
        height: 3.min(area.height),
    };

    let toast = Paragraph::new(message)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Black).bg(Color::Gray))
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(Clear, rect);
    frame.render_widget(toast, rect);
}

fn draw_permission_popup(frame: &mut Frame, message: &str) {
    let rect = centered_rect(60, 30, frame.area());
    let text = format!("{}\n\n按任意键关闭", message);

    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" ⚠️ 权限不足 ")
                .style(Style::default().fg(Color::Yellow)),
        );

    frame.render_widget(Clear, rect);
    frame.render_widget(popup, rect);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
