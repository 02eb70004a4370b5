//! 作业调度平台的进程入口：按运行模式组装调度中心与执行器，并负责优雅关闭。

pub mod app;
pub mod shutdown;
