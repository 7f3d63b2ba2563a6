//! 通信协议类型定义
//!
//! 此模块定义了 probe 和 collector 之间通信的共享类型，
//! 以及 probe 从本地代理接口读取连接列表的结构体。

pub mod agent;
pub mod report;
